//! Read-only database service surface.
//!
//! `ReadOnlyServer` wraps a database adapter behind the safety gate:
//! every query passes `ensure_read_only` before touching the database,
//! named bind parameters are rewritten to the backend's placeholder
//! syntax, and the introspected schema is cached per connection.

use crate::bind::{self, BindAnalysis};
use crate::db::{DatabaseAdapter, DatabaseBackend, QueryResult, Schema, SchemaProfile, Value};
use crate::error::{PilotError, Result};
use crate::safety::ensure_read_only;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A database handle that only ever executes SELECT statements.
pub struct ReadOnlyServer {
    adapter: Arc<dyn DatabaseAdapter>,
    schema_cache: RwLock<Option<Arc<Schema>>>,
}

impl ReadOnlyServer {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>) -> Self {
        Self {
            adapter,
            schema_cache: RwLock::new(None),
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.adapter.backend()
    }

    pub fn adapter(&self) -> Arc<dyn DatabaseAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Executes a SELECT statement with named bind parameters.
    ///
    /// The statement is rejected before execution if it is anything other
    /// than a single SELECT, or if a parameter has no supplied value.
    pub async fn read_query(
        &self,
        sql: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<QueryResult> {
        ensure_read_only(sql)?;

        let (rewritten, bind_params) = bind::rewrite_placeholders(sql, self.backend());
        let mut values = Vec::with_capacity(bind_params.len());
        for param in &bind_params {
            let Some(name) = param.name.as_deref() else {
                return Err(PilotError::query(
                    "positional '?' parameters are not supported; use named parameters",
                ));
            };
            let value = params.get(name).ok_or_else(|| {
                PilotError::query(format!("no value supplied for parameter '{}'", param.style))
            })?;
            values.push(value.clone());
        }

        debug!(sql = %rewritten, params = bind_params.len(), "executing read query");
        let result = self.adapter.execute_query(&rewritten, &values).await?;
        info!(
            rows = result.row_count,
            truncated = result.was_truncated,
            "read query completed"
        );
        Ok(result)
    }

    /// Executes an already-gated statement with pre-resolved bind values.
    ///
    /// Callers that do their own parameter resolution (the agent binds
    /// from the user context) use this after `ensure_read_only`; the gate
    /// runs here again regardless.
    pub async fn execute_bound(&self, sql: &str, values: &[Value]) -> Result<QueryResult> {
        ensure_read_only(sql)?;
        let (rewritten, bind_params) = bind::rewrite_placeholders(sql, self.backend());
        if bind_params.len() != values.len() {
            return Err(PilotError::query(format!(
                "query has {} parameters but {} values were supplied",
                bind_params.len(),
                values.len()
            )));
        }
        self.adapter.execute_query(&rewritten, values).await
    }

    /// Returns the cached schema, introspecting on first use.
    pub async fn get_schema(&self) -> Result<Arc<Schema>> {
        if let Some(schema) = self.schema_cache.read().await.as_ref() {
            return Ok(Arc::clone(schema));
        }

        let mut guard = self.schema_cache.write().await;
        // Another task may have filled the cache while we waited.
        if let Some(schema) = guard.as_ref() {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(self.adapter.introspect_schema().await?);
        info!(
            tables = schema.tables.len(),
            foreign_keys = schema.foreign_keys.len(),
            "schema introspected"
        );
        *guard = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// Discards the cached schema so the next access re-introspects.
    pub async fn refresh_schema(&self) -> Result<Arc<Schema>> {
        self.schema_cache.write().await.take();
        self.get_schema().await
    }

    /// Renders the schema as compact text for prompt construction.
    pub async fn get_schema_text(&self) -> Result<String> {
        Ok(self.get_schema().await?.format_for_llm())
    }

    /// Builds the enriched schema profile: row counts, sample data, enum
    /// candidates and business-purpose classification per table.
    pub async fn get_schema_for_llm(&self) -> Result<serde_json::Value> {
        let schema = self.get_schema().await?;
        let profile = SchemaProfile::build(self.adapter.as_ref(), &schema).await?;
        Ok(profile.to_llm_json())
    }

    /// Analyzes the bind parameters of a statement against the schema.
    pub async fn analyze_bind_parameters(&self, sql: &str) -> Result<BindAnalysis> {
        let schema = self.get_schema().await?;
        Ok(bind::analyze_bind_parameters(sql, Some(&schema)))
    }

    pub async fn close(&self) -> Result<()> {
        self.adapter.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, ColumnInfo, MockAdapter, Table};
    use pretty_assertions::assert_eq;

    fn banking_schema() -> Schema {
        Schema {
            tables: vec![Table {
                name: "Account".to_string(),
                columns: vec![
                    Column::new("AccountID", "INTEGER").nullable(false),
                    Column::new("CustomerID", "INTEGER").nullable(false),
                    Column::new("Balance", "DECIMAL(10,2)"),
                ],
                primary_key: vec!["AccountID".to_string()],
            }],
            foreign_keys: vec![],
        }
    }

    fn server_with_mock() -> (ReadOnlyServer, Arc<MockAdapter>) {
        let adapter = Arc::new(MockAdapter::with_schema(banking_schema()));
        let server = ReadOnlyServer::new(Arc::clone(&adapter) as Arc<dyn DatabaseAdapter>);
        (server, adapter)
    }

    #[tokio::test]
    async fn test_read_query_rejects_mutations() {
        let (server, _) = server_with_mock();
        let err = server
            .read_query("DELETE FROM Account", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsafe query rejected"));
    }

    #[tokio::test]
    async fn test_read_query_binds_named_parameters() {
        let (server, adapter) = server_with_mock();
        let mut params = BTreeMap::new();
        params.insert("CustomerID".to_string(), Value::Int(7));

        server
            .read_query(
                "SELECT * FROM Account WHERE CustomerID = :CustomerID",
                &params,
            )
            .await
            .unwrap();

        let executed = adapter.executed_queries();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].0,
            "SELECT * FROM Account WHERE CustomerID = ?"
        );
        assert_eq!(executed[0].1, vec![Value::Int(7)]);
    }

    #[tokio::test]
    async fn test_read_query_missing_parameter_value() {
        let (server, _) = server_with_mock();
        let err = server
            .read_query(
                "SELECT * FROM Account WHERE CustomerID = :CustomerID",
                &BTreeMap::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains(":CustomerID"));
    }

    #[tokio::test]
    async fn test_read_query_rejects_positional() {
        let (server, _) = server_with_mock();
        let err = server
            .read_query("SELECT * FROM Account WHERE CustomerID = ?", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("positional"));
    }

    #[tokio::test]
    async fn test_schema_is_cached() {
        let (server, _) = server_with_mock();
        let first = server.get_schema().await.unwrap();
        let second = server.get_schema().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.tables[0].name, "Account");
    }

    #[tokio::test]
    async fn test_refresh_schema_reintrospects() {
        let (server, _) = server_with_mock();
        let first = server.get_schema().await.unwrap();
        let refreshed = server.refresh_schema().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(refreshed.tables[0].name, "Account");

        // The refreshed schema is what later calls see.
        let cached = server.get_schema().await.unwrap();
        assert!(Arc::ptr_eq(&refreshed, &cached));
    }

    #[tokio::test]
    async fn test_schema_text_lists_tables_and_columns() {
        let (server, _) = server_with_mock();
        let text = server.get_schema_text().await.unwrap();
        assert!(text.contains("Account"));
        assert!(text.contains("CustomerID"));
    }

    #[tokio::test]
    async fn test_execute_bound_checks_arity() {
        let (server, _) = server_with_mock();
        let err = server
            .execute_bound(
                "SELECT * FROM Account WHERE CustomerID = :cid",
                &[Value::Int(1), Value::Int(2)],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 parameters but 2 values"));
    }

    #[tokio::test]
    async fn test_canned_results_flow_through() {
        let adapter = Arc::new(
            MockAdapter::with_schema(banking_schema())
                .with_result(
                    "FROM Account",
                    QueryResult::with_data(
                        vec![ColumnInfo::new("Balance", "DECIMAL")],
                        vec![vec![Value::Float(1250.50)]],
                    ),
                ),
        );
        let server = ReadOnlyServer::new(adapter as Arc<dyn DatabaseAdapter>);

        let result = server
            .read_query("SELECT Balance FROM Account", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0][0], Value::Float(1250.50));
    }
}
