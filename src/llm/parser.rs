//! Output parsers that turn a raw LLM completion into a usable value.
//!
//! Two parsers are provided: [`clean`], which strips reasoning scratchpad
//! and markup for plain-text consumers (the Report Generator), and
//! [`extract_json`]/[`extract_json_array`], which pull a single well-formed
//! JSON object or array out of a noisy completion for structured consumers
//! (GenerateSQL and SplitQuery respectively).

use crate::error::{EngineError, Result};

/// Strips `<think>...</think>` spans and any other markup tags, then
/// collapses runs of whitespace. Idempotent: `clean(clean(x)) == clean(x)`.
pub fn clean(input: &str) -> String {
    let without_think = strip_think_tags(input);
    let without_tags = strip_tags(&without_think);
    collapse_whitespace(&without_tags)
}

fn strip_think_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    loop {
        match rest.find("<think>") {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("</think>") {
                    Some(end_rel) => {
                        let end = start + end_rel + "</think>".len();
                        rest = &rest[end..];
                    }
                    None => {
                        // Unterminated tag: drop the rest as scratchpad.
                        return out;
                    }
                }
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips a single ` ``` [lang]? ... ``` ` code-fence wrapper if present,
/// returning the fenced body; otherwise returns the input unchanged.
fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(close_rel) = after_open.rfind("```") else {
        return trimmed;
    };
    let body = &after_open[..close_rel];

    // Drop an optional single-word language tag on the fence's own line
    // (e.g. "json\n{...}" -> "{...}").
    let body = match body.find('\n') {
        Some(newline) => {
            let first_line = body[..newline].trim();
            if !first_line.is_empty() && first_line.chars().all(|c| c.is_alphanumeric()) {
                &body[newline + 1..]
            } else {
                body
            }
        }
        None => body,
    };

    body.trim()
}

/// Extracts the first maximal brace-balanced `{...}` substring, after
/// stripping an optional surrounding code fence. Fails with `parse_error`
/// if no balanced object exists.
pub fn extract_json(input: &str) -> Result<String> {
    extract_balanced(input, '{', '}', "object")
}

/// Extracts the first maximal bracket-balanced `[...]` substring, after
/// stripping an optional surrounding code fence. Used by SplitQuery to pull
/// a plan array out of the completion.
pub fn extract_json_array(input: &str) -> Result<String> {
    extract_balanced(input, '[', ']', "array")
}

fn extract_balanced(input: &str, open: char, close: char, kind: &str) -> Result<String> {
    let stripped = strip_code_fence(input);

    let start = stripped
        .find(open)
        .ok_or_else(|| EngineError::parse(format!("No JSON {kind} found in LLM output")))?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, c) in stripped[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end.ok_or_else(|| EngineError::parse(format!("Unbalanced JSON {kind} in LLM output")))?;
    Ok(stripped[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_think_tags() {
        let input = "<think>internal reasoning</think>The answer is 42.";
        assert_eq!(clean(input), "The answer is 42.");
    }

    #[test]
    fn test_clean_strips_other_tags() {
        let input = "<b>bold</b> and <i>italic</i>";
        assert_eq!(clean(input), "bold and italic");
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        let input = "too    many\n\nspaces";
        assert_eq!(clean(input), "too many spaces");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let input = "<think>scratch</think>  final   answer  ";
        let once = clean(input);
        let twice = clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_clean_unterminated_think_tag_drops_rest() {
        let input = "before <think>never closes";
        assert_eq!(clean(input), "before");
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let input = "```json\n{\"a\":1}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_extract_json_from_unfenced_text() {
        let input = "Sure, here you go: {\"sql\": \"SELECT 1\"} — hope that helps.";
        assert_eq!(extract_json(input).unwrap(), r#"{"sql": "SELECT 1"}"#);
    }

    #[test]
    fn test_extract_json_handles_nested_braces() {
        let input = r#"{"outer": {"inner": 1}, "x": 2}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn test_extract_json_ignores_braces_inside_strings() {
        let input = r#"{"text": "a { b } c"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn test_extract_json_fails_on_no_object() {
        assert!(extract_json("no json here").is_err());
    }

    #[test]
    fn test_extract_json_fails_on_unbalanced() {
        assert!(extract_json("{\"a\": 1").is_err());
    }

    #[test]
    fn test_extract_json_plain_fence_no_language() {
        let input = "```\n{\"a\":1}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_extract_json_array_from_fenced_block() {
        let input = "```json\n[\"a\", \"b\"]\n```";
        assert_eq!(extract_json_array(input).unwrap(), r#"["a", "b"]"#);
    }

    #[test]
    fn test_extract_json_array_from_noisy_text() {
        let input = "Here is the plan: [\"sub query one\", \"sub query two\"] done.";
        assert_eq!(
            extract_json_array(input).unwrap(),
            r#"["sub query one", "sub query two"]"#
        );
    }

    #[test]
    fn test_extract_json_array_fails_on_no_array() {
        assert!(extract_json_array("{\"a\": 1}").is_err());
    }
}
