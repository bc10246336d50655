//! Command-line argument parsing for the analyst engine's headless driver.
//!
//! Exposes the invocation surface (§6) as subcommands: running or streaming
//! the full pipeline, and managing/invoking individual registered
//! subgraphs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Turns a natural-language financial question into an analytical report.
#[derive(Parser, Debug)]
#[command(name = "analyst-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path (defaults to the platform config dir).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Overrides `db.url` from the config file / PG* environment variables.
    #[arg(long, env = "DATABASE_URL", value_name = "URL")]
    pub db_url: Option<String>,

    /// Overrides `llm.base_url`.
    #[arg(long, value_name = "URL")]
    pub llm_base_url: Option<String>,

    /// Overrides `llm.model_name`.
    #[arg(long, value_name = "MODEL")]
    pub llm_model: Option<String>,

    /// Overrides `pipeline.parallel_plan_steps`.
    #[arg(long)]
    pub parallel: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the full pipeline to completion and prints the final report.
    Run {
        /// The natural-language question to analyze.
        query: String,
    },
    /// Runs the full pipeline, printing one state snapshot per stage.
    Stream {
        /// The natural-language question to analyze.
        query: String,
    },
    /// Manages and invokes individually addressable subgraphs.
    #[command(subcommand)]
    Subgraph(SubgraphCommand),
}

#[derive(Subcommand, Debug)]
pub enum SubgraphCommand {
    /// Lists the names of all registered subgraphs.
    List,
    /// Prints the descriptor for a registered subgraph.
    Get { name: String },
    /// Removes a registered subgraph. Exits non-zero if it wasn't found.
    Remove { name: String },
    /// Registers the built-in split_query/generate_sql/fetch_data subgraphs
    /// under their default names, using the active configuration.
    RegisterDefaults,
    /// Invokes a registered subgraph against a fresh state for `query` and
    /// prints the resulting state.
    Run { name: String, query: String },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(analyst_engine::config::EngineConfig::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_parse_run_query() {
        let cli = parse_args(&["analyst-engine", "run", "top 5 revenue accounts"]);
        match cli.command {
            Command::Run { query } => assert_eq!(query, "top 5 revenue accounts"),
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_stream_query() {
        let cli = parse_args(&["analyst-engine", "stream", "compare Q1 and Q2 revenue"]);
        assert!(matches!(cli.command, Command::Stream { .. }));
    }

    #[test]
    fn test_parse_subgraph_list() {
        let cli = parse_args(&["analyst-engine", "subgraph", "list"]);
        assert!(matches!(cli.command, Command::Subgraph(SubgraphCommand::List)));
    }

    #[test]
    fn test_parse_subgraph_run() {
        let cli = parse_args(&["analyst-engine", "subgraph", "run", "split", "a question"]);
        match cli.command {
            Command::Subgraph(SubgraphCommand::Run { name, query }) => {
                assert_eq!(name, "split");
                assert_eq!(query, "a question");
            }
            other => panic!("expected Subgraph(Run), got {other:?}"),
        }
    }

    #[test]
    fn test_global_overrides() {
        let cli = parse_args(&[
            "analyst-engine",
            "--llm-model",
            "llama3.2:70b",
            "--parallel",
            "run",
            "q",
        ]);
        assert_eq!(cli.llm_model, Some("llama3.2:70b".to_string()));
        assert!(cli.parallel);
    }

    #[test]
    fn test_config_path_default_when_absent() {
        let cli = parse_args(&["analyst-engine", "run", "q"]);
        assert!(cli.config_path().ends_with("config.toml"));
    }
}
