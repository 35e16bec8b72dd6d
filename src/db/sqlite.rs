//! SQLite database adapter.
//!
//! Provides the `SqliteAdapter` struct that implements the `DatabaseAdapter`
//! trait using sqlx. Introspection goes through `sqlite_master` and the
//! `table_info` / `foreign_key_list` PRAGMAs.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseAdapter, DatabaseBackend, ForeignKey, QueryResult, Row, Schema,
    Table, Value,
};
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, Sqlite, TypeInfo};
use std::time::{Duration, Instant};
use tracing::warn;

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum rows to return from a query.
const MAX_ROWS: usize = 1000;

/// SQLite database adapter.
#[derive(Debug)]
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Opens the database file (or in-memory database) named by the config.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        // An in-memory database exists per connection, so the pool must
        // hold exactly one.
        let max_connections = if conn_str.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&conn_str)
            .await
            .map_err(|e| {
                PilotError::connection(format!("Cannot open SQLite database: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Creates an adapter from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let table_names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PilotError::query(format!("Failed to fetch tables: {e}")))?;

        let mut tables = Vec::with_capacity(table_names.len());
        let mut foreign_keys = Vec::new();

        for table_name in table_names {
            let (columns, primary_key) = self.fetch_columns(&table_name).await?;
            foreign_keys.extend(self.fetch_foreign_keys(&table_name).await?);

            tables.push(Table {
                name: table_name,
                columns,
                primary_key,
            });
        }

        Ok(Schema {
            tables,
            foreign_keys,
        })
    }

    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            query.fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            PilotError::query(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| PilotError::query(e.to_string()))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let total_rows = result.len();
        let was_truncated = total_rows > MAX_ROWS;

        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                total_rows, MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().take(MAX_ROWS).map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
            total_rows: Some(total_rows),
            was_truncated,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteAdapter {
    /// Fetches columns and the primary key for a table via `PRAGMA table_info`.
    async fn fetch_columns(&self, table_name: &str) -> Result<(Vec<Column>, Vec<String>)> {
        // PRAGMA arguments cannot be bound, so the identifier is quoted in.
        let pragma = format!(
            "PRAGMA table_info({})",
            DatabaseBackend::Sqlite.quote_ident(table_name)
        );

        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&pragma)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    PilotError::query(format!("Failed to fetch columns for {table_name}: {e}"))
                })?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut primary_key = Vec::new();

        for (_cid, name, data_type, notnull, default, pk) in rows {
            if pk > 0 {
                primary_key.push(name.clone());
            }
            columns.push(Column {
                name,
                data_type,
                is_nullable: notnull == 0,
                default,
            });
        }

        Ok((columns, primary_key))
    }

    /// Fetches foreign keys for a table via `PRAGMA foreign_key_list`.
    async fn fetch_foreign_keys(&self, table_name: &str) -> Result<Vec<ForeignKey>> {
        let pragma = format!(
            "PRAGMA foreign_key_list({})",
            DatabaseBackend::Sqlite.quote_ident(table_name)
        );

        let rows: Vec<(i64, i64, String, String, Option<String>, String, String, String)> =
            sqlx::query_as(&pragma)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    PilotError::query(format!(
                        "Failed to fetch foreign keys for {table_name}: {e}"
                    ))
                })?;

        Ok(rows
            .into_iter()
            .map(|(_id, _seq, to_table, from_column, to_column, ..)| ForeignKey {
                from_table: table_name.to_string(),
                // A NULL target column references the parent's primary key.
                to_column: to_column.unwrap_or_else(|| from_column.clone()),
                from_column,
                to_table,
            })
            .collect())
    }
}

/// Binds one of our values onto a sqlx query.
fn bind_value<'q>(
    query: Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q Value,
) -> Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
    }
}

/// Converts a sqlx SqliteRow to our Row type.
fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a SqliteRow to our Value type.
fn convert_value(row: &SqliteRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOLEAN" | "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}
