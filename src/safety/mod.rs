//! Query safety classification.
//!
//! Parses SQL and classifies statements so the read-only gate can decide
//! whether a query is allowed to run. The gate is binary: a single plain
//! SELECT proceeds, everything else (DML, DDL, multiple statements,
//! unparseable text) is rejected outright.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use crate::error::{PilotError, Result};
use std::fmt;

/// Safety level classification for SQL queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
    /// Read-only queries (SELECT, EXPLAIN, SHOW).
    Safe,
    /// Data modification queries (INSERT, UPDATE, MERGE).
    Mutating,
    /// Data loss or schema changes (DELETE, DROP, TRUNCATE, ALTER, ...).
    Destructive,
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
    Explain,
    Show,
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
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Multiple(inner) => write!(f, "Multiple ({inner})"),
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
    /// Optional detail for the caller, e.g. why classification failed.
    pub detail: Option<String>,
}

impl ClassificationResult {
    /// Creates a new classification result.
    pub fn new(level: SafetyLevel, statement_type: StatementType) -> Self {
        Self {
            level,
            statement_type,
            detail: None,
        }
    }

    /// Creates a classification result with a detail message.
    pub fn with_detail(
        level: SafetyLevel,
        statement_type: StatementType,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            level,
            statement_type,
            detail: Some(detail.into()),
        }
    }
}

/// Gate applied to every query before execution.
///
/// Accepts exactly one parsed statement, and only when it is a plain
/// SELECT with no data-modifying CTEs or subqueries. Returns an
/// `Unsafe` error for everything else, including text that fails to parse.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let result = classify_sql(sql);

    if let StatementType::Multiple(_) = result.statement_type {
        return Err(PilotError::unsafe_query(
            "multiple statements are not allowed",
        ));
    }

    match (result.level, &result.statement_type) {
        (SafetyLevel::Safe, StatementType::Select) => Ok(()),
        (_, StatementType::Unknown) => Err(PilotError::unsafe_query(
            result
                .detail
                .unwrap_or_else(|| "query could not be parsed".to_string()),
        )),
        (_, stmt_type) => Err(PilotError::unsafe_query(format!(
            "only SELECT statements are allowed, got {stmt_type}"
        ))),
    }
}
