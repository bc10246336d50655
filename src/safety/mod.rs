//! Query safety classification module.
//!
//! Parses SQL and classifies queries as safe, mutating, or destructive
//! to determine whether user confirmation is required before execution.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use crate::error::{EngineError, Result};
use std::fmt;

/// Validates that `sql` is a single read-only statement: rejects anything
/// classified as `Mutating`/`Destructive`, and rejects multi-statement
/// batches (the generator must emit one candidate per statement, not a
/// `;`-delimited script).
pub fn validate_read_only(sql: &str) -> Result<()> {
    let result = classify_sql(sql);

    if matches!(result.statement_type, StatementType::Multiple(_)) {
        return Err(EngineError::validation(
            "multiple statements are not permitted in a single SQL candidate",
        ));
    }

    if result.level != SafetyLevel::Safe {
        return Err(EngineError::validation(format!(
            "statement is not read-only ({})",
            result.statement_type
        )));
    }

    Ok(())
}

/// Safety level classification for SQL queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
    /// Read-only queries that can be auto-executed (SELECT, EXPLAIN, SHOW).
    Safe,
    /// Data modification queries that require confirmation (INSERT, UPDATE).
    Mutating,
    /// Potentially destructive queries requiring confirmation with warning
    /// (DELETE, DROP, TRUNCATE, ALTER).
    Destructive,
}

impl SafetyLevel {
    /// Returns true if this safety level requires user confirmation.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::Mutating | Self::Destructive)
    }

    /// Returns true if this safety level should show a warning.
    pub fn requires_warning(&self) -> bool {
        matches!(self, Self::Destructive)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Mutating => write!(f, "Mutating"),
            Self::Destructive => write!(f, "Destructive"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    Explain,
    Show,
    With,
    Merge,
    /// Multiple statements detected; contains the most dangerous type.
    Multiple(Box<StatementType>),
    /// Statement type could not be determined.
    Unknown,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::With => write!(f, "WITH (CTE)"),
            Self::Merge => write!(f, "MERGE"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The determined safety level.
    pub level: SafetyLevel,
    /// The type of statement(s) detected.
    pub statement_type: StatementType,
    /// Optional warning message for the user.
    pub warning: Option<String>,
}

impl ClassificationResult {
    /// Creates a new classification result.
    pub fn new(level: SafetyLevel, statement_type: StatementType) -> Self {
        Self {
            level,
            statement_type,
            warning: None,
        }
    }

    /// Creates a classification result with a warning message.
    pub fn with_warning(
        level: SafetyLevel,
        statement_type: StatementType,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            level,
            statement_type,
            warning: Some(warning.into()),
        }
    }

    /// Returns true if user confirmation is required.
    pub fn requires_confirmation(&self) -> bool {
        self.level.requires_confirmation()
    }

    /// Returns true if a warning should be displayed.
    pub fn requires_warning(&self) -> bool {
        self.level.requires_warning()
    }
}
