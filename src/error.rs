//! Error types for sqlpilot.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for sqlpilot operations.
#[derive(Error, Debug)]
pub enum PilotError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, missing tables, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// SQL text that could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Statements rejected by the read-only gate.
    #[error("Unsafe query rejected: {0}")]
    Unsafe(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid connection string, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PilotError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates an unsafe-query rejection with the given message.
    pub fn unsafe_query(msg: impl Into<String>) -> Self {
        Self::Unsafe(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Parse(_) => "Parse Error",
            Self::Unsafe(_) => "Unsafe Query",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using PilotError.
pub type Result<T> = std::result::Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = PilotError::connection("Cannot connect to localhost:5432");
        assert_eq!(
            err.to_string(),
            "Connection error: Cannot connect to localhost:5432"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = PilotError::query("no such table: Accouns");
        assert_eq!(err.to_string(), "Query error: no such table: Accouns");
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_unsafe() {
        let err = PilotError::unsafe_query("only SELECT statements are allowed");
        assert_eq!(
            err.to_string(),
            "Unsafe query rejected: only SELECT statements are allowed"
        );
        assert_eq!(err.category(), "Unsafe Query");
    }

    #[test]
    fn test_error_display_llm() {
        let err = PilotError::llm("Rate limited. Please wait.");
        assert_eq!(err.to_string(), "LLM error: Rate limited. Please wait.");
        assert_eq!(err.category(), "LLM Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = PilotError::config("unsupported scheme 'oracle'");
        assert_eq!(
            err.to_string(),
            "Configuration error: unsupported scheme 'oracle'"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PilotError>();
    }
}
