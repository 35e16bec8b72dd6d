//! Mock database adapter for testing.
//!
//! Provides an in-memory adapter with a fixed schema, canned query results
//! and a record of executed queries.

use super::{ColumnInfo, DatabaseAdapter, DatabaseBackend, QueryResult, Row, Schema, Value};
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database adapter that returns predefined results.
pub struct MockAdapter {
    schema: Schema,
    canned: Mutex<Vec<(String, QueryResult)>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MockAdapter {
    /// Creates a new mock adapter with an empty schema.
    pub fn new() -> Self {
        Self::with_schema(Schema::default())
    }

    /// Creates a new mock adapter with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            canned: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Registers a canned result for queries containing the given fragment.
    pub fn with_result(self, sql_fragment: impl Into<String>, result: QueryResult) -> Self {
        self.canned
            .lock()
            .unwrap()
            .push((sql_fragment.into(), result));
        self
    }

    /// Returns the queries executed so far, with their bound values.
    pub fn executed_queries(&self) -> Vec<(String, Vec<Value>)> {
        self.executed.lock().unwrap().clone()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));

        let canned = self.canned.lock().unwrap();
        for (fragment, result) in canned.iter() {
            if sql.contains(fragment.as_str()) {
                return Ok(result.clone());
            }
        }

        // Default: one informational row so callers always see a result shape.
        let columns = vec![ColumnInfo::new("result", "TEXT")];
        let rows: Vec<Row> = vec![vec![Value::String(format!("Mock result for: {sql}"))]];

        Ok(QueryResult {
            columns,
            rows,
            execution_time: Duration::from_millis(1),
            row_count: 1,
            total_rows: Some(1),
            was_truncated: false,
        })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A mock adapter whose every operation fails, for error-path testing.
pub struct FailingAdapter;

#[async_trait]
impl DatabaseAdapter for FailingAdapter {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Err(PilotError::connection("mock connection failure"))
    }

    async fn execute_query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Err(PilotError::query("mock query failure"))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
