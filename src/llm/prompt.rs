//! Binds a prompt template, an LLM client, and an output parser into a
//! single invokable unit.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::llm::client::LlmClient;

/// A template + LLM + parser triple, invoked with a variable mapping.
///
/// `T` is whatever the parser produces — a `String` for the Clean parser,
/// or a deserialized struct for the JSON-struct parser.
pub struct PromptChain<T> {
    template: String,
    llm: Arc<dyn LlmClient>,
    parse: Box<dyn Fn(&str) -> Result<T> + Send + Sync>,
}

impl<T> PromptChain<T> {
    pub fn new(
        template: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        parse: impl Fn(&str) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            template: template.into(),
            llm,
            parse: Box::new(parse),
        }
    }

    /// Renders the template with `vars`, fails with `template_error` if a
    /// `{name}` placeholder in the template has no corresponding entry.
    /// Extra entries in `vars` that the template doesn't reference are
    /// ignored.
    fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let Some(close) = after_open.find('}') else {
                rendered.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let name = &after_open[..close];
            let value = vars.get(name).ok_or_else(|| {
                EngineError::template(format!("Missing template variable: {name}"))
            })?;
            rendered.push_str(value);
            rest = &after_open[close + 1..];
        }
        rendered.push_str(rest);
        Ok(rendered)
    }

    /// Blocking-style invocation; see the client trait's note on `invoke`
    /// vs `invoke_async` — both drive the same request.
    pub async fn invoke(&self, vars: &HashMap<String, String>) -> Result<T> {
        self.invoke_async(vars).await
    }

    pub async fn invoke_async(&self, vars: &HashMap<String, String>) -> Result<T> {
        let prompt = self.render(vars)?;
        let text = self.llm.invoke_async(&prompt).await?;
        (self.parse)(&text)
    }
}

/// Convenience constructor for a two-variable `vars` map, common across the
/// pipeline's stages.
pub fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlmClient;
    use crate::llm::parser::clean;

    fn chain(llm: Arc<dyn LlmClient>) -> PromptChain<String> {
        PromptChain::new("Question: {query}\nSchema: {db_struc}", llm, |text| {
            Ok(clean(text))
        })
    }

    #[tokio::test]
    async fn test_render_and_invoke() {
        let mock = MockLlmClient::new().with_response("top 5 revenue", "a clean answer");
        let llm: Arc<dyn LlmClient> = Arc::new(mock);
        let chain = chain(llm);
        let result = chain
            .invoke(&vars(&[("query", "top 5 revenue"), ("db_struc", "")]))
            .await
            .unwrap();
        assert_eq!(result, "a clean answer");
    }

    #[tokio::test]
    async fn test_missing_variable_is_template_error() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());
        let chain = chain(llm);
        let err = chain
            .invoke(&vars(&[("query", "x")]))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "template_error");
    }

    #[tokio::test]
    async fn test_excess_variables_are_ignored() {
        let mock = MockLlmClient::new().with_response("hi", "ok");
        let llm: Arc<dyn LlmClient> = Arc::new(mock);
        let chain = chain(llm);
        let result = chain
            .invoke(&vars(&[
                ("query", "hi"),
                ("db_struc", ""),
                ("unused", "ignored"),
            ]))
            .await
            .unwrap();
        assert_eq!(result, "ok");
    }
}
