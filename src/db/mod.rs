//! Database abstraction layer for sqlpilot.
//!
//! Provides a trait-based interface for database operations, allowing
//! different database backends to be used interchangeably.

pub mod analysis;
mod mock;
mod mysql;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use analysis::{SchemaProfile, TableProfile};
pub use mock::{FailingAdapter, MockAdapter};
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use schema::{Column, ForeignKey, Schema, Table};
pub use sqlite::SqliteAdapter;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Postgres,
    MySql,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    /// Returns the default port for this backend (none for SQLite).
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Quotes an identifier for this backend's SQL dialect.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Returns the positional placeholder for the 1-based parameter index.
    ///
    /// This is what named parameters are rewritten to before binding.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Sqlite | Self::MySql => "?".to_string(),
        }
    }
}

/// Creates a database adapter for the given backend and configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn DatabaseAdapter>> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            let adapter = SqliteAdapter::connect(config).await?;
            Ok(Box::new(adapter))
        }
        DatabaseBackend::Postgres => {
            let adapter = PostgresAdapter::connect(config).await?;
            Ok(Box::new(adapter))
        }
        DatabaseBackend::MySql => {
            let adapter = MySqlAdapter::connect(config).await?;
            Ok(Box::new(adapter))
        }
    }
}

/// Trait defining the interface for database adapters.
///
/// All database operations are async and return Results with PilotError.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Returns the backend this adapter talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Introspects the database schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes a SQL query with positional bind values and returns the results.
    ///
    /// The SQL must already use this backend's placeholder syntax; values
    /// are bound in order.
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
