//! Error types for the analyst engine.
//!
//! Defines the main error enum used throughout the pipeline.

use thiserror::Error;

/// Main error type for engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration (numeric out of range, empty required field).
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM output could not be parsed as the structure the caller required.
    #[error("Parse error: {0}")]
    Parse(String),

    /// SQL failed dialect or read-only validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database connection or permission failure.
    #[error("Database error: {0}")]
    Db(String),

    /// Pool acquisition or query deadline exceeded.
    #[error("Database timeout: {0}")]
    DbTimeout(String),

    /// Network or non-2xx response from the LLM backend.
    #[error("LLM error: {0}")]
    Llm(String),

    /// A prompt template was invoked without a required variable bound.
    #[error("Template error: {0}")]
    Template(String),

    /// Cooperative cancellation was observed; not a failure.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A retry budget was depleted on an otherwise-recoverable failure.
    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),

    /// Internal invariant violation (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn db(msg: impl Into<String>) -> Self {
        Self::Db(msg.into())
    }

    pub fn db_timeout(msg: impl Into<String>) -> Self {
        Self::DbTimeout(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn budget_exhausted(msg: impl Into<String>) -> Self {
        Self::BudgetExhausted(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string, matching the `error taxonomy`
    /// names (`config_error`, `parse_error`, ...) for use in history entries
    /// and top-level logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Parse(_) => "parse_error",
            Self::Validation(_) => "validation_error",
            Self::Db(_) => "db_error",
            Self::DbTimeout(_) => "db_timeout",
            Self::Llm(_) => "llm_error",
            Self::Template(_) => "template_error",
            Self::Cancelled(_) => "cancelled",
            Self::BudgetExhausted(_) => "budget_exhausted",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Fatal errors surface to the orchestrator and abort the invocation;
    /// recoverable ones are handled locally within the offending subgraph.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Db(_) | Self::Template(_))
    }
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;
