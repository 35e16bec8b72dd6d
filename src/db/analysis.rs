//! Comprehensive schema profiling.
//!
//! Builds on plain introspection to produce the richer picture an LLM needs:
//! row counts, sample rows, likely enumerations, and a heuristic business
//! classification of each table and of the database as a whole.

use crate::db::{Column, DatabaseAdapter, ForeignKey, Schema, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Number of sample rows captured per table.
const SAMPLE_ROWS: usize = 5;

/// How many distinct values to scan when probing a column for enum-ness.
const ENUM_SCAN_LIMIT: usize = 20;

/// A column is considered enum-like when it has at most this many distinct values.
const ENUM_MAX_VALUES: usize = 15;

/// Heuristic classification of what a table is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessPurpose {
    UserManagement,
    TransactionManagement,
    ProductManagement,
    FinancialServices,
    OrganizationalManagement,
    GeneralPurpose,
}

impl BusinessPurpose {
    /// Classifies a table by keyword matching on its name.
    pub fn classify(table_name: &str) -> Self {
        let name = table_name.to_lowercase();
        let matches = |words: &[&str]| words.iter().any(|w| name.contains(w));

        if matches(&["user", "customer", "person", "account"]) {
            Self::UserManagement
        } else if matches(&["order", "purchase", "transaction", "payment"]) {
            Self::TransactionManagement
        } else if matches(&["product", "item", "inventory", "catalog"]) {
            Self::ProductManagement
        } else if matches(&["loan", "credit", "debit", "bank", "card"]) {
            Self::FinancialServices
        } else if matches(&["employee", "staff", "department", "branch"]) {
            Self::OrganizationalManagement
        } else {
            Self::GeneralPurpose
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserManagement => "user_management",
            Self::TransactionManagement => "transaction_management",
            Self::ProductManagement => "product_management",
            Self::FinancialServices => "financial_services",
            Self::OrganizationalManagement => "organizational_management",
            Self::GeneralPurpose => "general_purpose",
        }
    }
}

/// Everything we know about one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableProfile {
    pub columns: Vec<Column>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub row_count: i64,
    pub sample_data: Vec<serde_json::Map<String, serde_json::Value>>,
    pub detected_enums: BTreeMap<String, Vec<String>>,
    pub business_purpose: BusinessPurpose,
}

/// High-level summary across the whole database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub total_tables: usize,
    pub estimated_domain: String,
    pub key_patterns: Vec<String>,
}

/// The comprehensive schema profile handed to prompt generation and
/// serialized for `get_schema_for_llm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaProfile {
    pub database_type: String,
    /// Keyed by table name; a BTreeMap keeps serialization order stable.
    pub tables: BTreeMap<String, TableProfile>,
    pub relationships: Vec<ForeignKey>,
    pub summary: ProfileSummary,
}

impl SchemaProfile {
    /// Builds a profile by sampling the live database behind the adapter.
    ///
    /// Per-table sampling failures (views, permissions) degrade to empty
    /// samples rather than failing the whole profile.
    pub async fn build(adapter: &dyn DatabaseAdapter, schema: &Schema) -> Result<Self> {
        let backend = adapter.backend();
        let mut tables = BTreeMap::new();

        for table in &schema.tables {
            let quoted = backend.quote_ident(&table.name);

            let row_count = match adapter
                .execute_query(&format!("SELECT COUNT(*) FROM {quoted}"), &[])
                .await
            {
                Ok(result) => match result.rows.first().and_then(|r| r.first()) {
                    Some(Value::Int(n)) => *n,
                    _ => 0,
                },
                Err(e) => {
                    debug!(table = %table.name, error = %e, "Row count failed");
                    0
                }
            };

            let sample_data = adapter
                .execute_query(&format!("SELECT * FROM {quoted} LIMIT {SAMPLE_ROWS}"), &[])
                .await
                .map(|result| result.to_row_mappings())
                .unwrap_or_default();

            let mut detected_enums = BTreeMap::new();
            for column in &table.columns {
                if !column.is_text_type() {
                    continue;
                }
                let col = backend.quote_ident(&column.name);
                let sql = format!(
                    "SELECT DISTINCT {col} FROM {quoted} WHERE {col} IS NOT NULL LIMIT {ENUM_SCAN_LIMIT}"
                );
                if let Ok(result) = adapter.execute_query(&sql, &[]).await {
                    let values: Vec<String> = result
                        .rows
                        .iter()
                        .filter_map(|row| match row.first() {
                            Some(Value::String(s)) => Some(s.clone()),
                            _ => None,
                        })
                        .collect();

                    if !values.is_empty() && values.len() <= ENUM_MAX_VALUES {
                        detected_enums.insert(column.name.clone(), values);
                    }
                }
            }

            let foreign_keys: Vec<ForeignKey> = schema
                .foreign_keys
                .iter()
                .filter(|fk| fk.from_table == table.name)
                .cloned()
                .collect();

            tables.insert(
                table.name.clone(),
                TableProfile {
                    columns: table.columns.clone(),
                    primary_keys: table.primary_key.clone(),
                    foreign_keys,
                    row_count,
                    sample_data,
                    detected_enums,
                    business_purpose: BusinessPurpose::classify(&table.name),
                },
            );
        }

        let relationships = schema.foreign_keys.clone();
        let summary = summarize(&tables, &relationships);

        Ok(Self {
            database_type: backend.as_str().to_string(),
            tables,
            relationships,
            summary,
        })
    }

    /// Serializes the profile as the JSON document handed to LLM callers.
    pub fn to_llm_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Returns the table names ordered by how connected (then how large)
    /// each table is. The most connected tables make the best examples.
    pub fn tables_by_importance(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_by_key(|name| {
            let profile = &self.tables[*name];
            std::cmp::Reverse((profile.foreign_keys.len(), profile.row_count))
        });
        names
    }
}

fn summarize(
    tables: &BTreeMap<String, TableProfile>,
    relationships: &[ForeignKey],
) -> ProfileSummary {
    // Most common purpose wins the domain estimate.
    let mut purpose_counts: BTreeMap<BusinessPurpose, usize> = BTreeMap::new();
    for profile in tables.values() {
        *purpose_counts.entry(profile.business_purpose).or_default() += 1;
    }
    let estimated_domain = purpose_counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(purpose, _)| purpose.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let all_columns: Vec<&str> = tables
        .values()
        .flat_map(|t| t.columns.iter().map(|c| c.name.as_str()))
        .collect();

    let mut key_patterns = Vec::new();
    if all_columns.iter().any(|name| name.contains("ID")) {
        key_patterns.push("uses_id_pattern".to_string());
    }
    if all_columns
        .iter()
        .any(|name| name.to_lowercase().contains("date") || name.to_lowercase().contains("time"))
    {
        key_patterns.push("includes_temporal_data".to_string());
    }
    if all_columns
        .iter()
        .any(|name| name.to_lowercase().contains("status") || name.to_lowercase().contains("state"))
    {
        key_patterns.push("uses_status_fields".to_string());
    }
    if !relationships.is_empty() {
        key_patterns.push("has_relationships".to_string());
    }

    ProfileSummary {
        total_tables: tables.len(),
        estimated_domain,
        key_patterns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockAdapter;
    use crate::db::{ColumnInfo, QueryResult, Table};
    use pretty_assertions::assert_eq;

    fn banking_schema() -> Schema {
        Schema {
            tables: vec![
                Table {
                    name: "Account".to_string(),
                    columns: vec![
                        Column::new("AccountID", "INTEGER").nullable(false),
                        Column::new("AccountType", "VARCHAR").nullable(false),
                        Column::new("Status", "VARCHAR"),
                        Column::new("OpenDate", "TIMESTAMP"),
                    ],
                    primary_key: vec!["AccountID".to_string()],
                },
                Table {
                    name: "Loan".to_string(),
                    columns: vec![
                        Column::new("LoanID", "INTEGER").nullable(false),
                        Column::new("AccountID", "INTEGER").nullable(false),
                    ],
                    primary_key: vec!["LoanID".to_string()],
                },
            ],
            foreign_keys: vec![ForeignKey::new("Loan", "AccountID", "Account", "AccountID")],
        }
    }

    fn enum_result(values: &[&str]) -> QueryResult {
        QueryResult::with_data(
            vec![ColumnInfo::new("v", "TEXT")],
            values
                .iter()
                .map(|v| vec![Value::String(v.to_string())])
                .collect(),
        )
    }

    #[test]
    fn test_business_purpose_classification() {
        assert_eq!(
            BusinessPurpose::classify("Customer"),
            BusinessPurpose::UserManagement
        );
        assert_eq!(
            BusinessPurpose::classify("BankTransaction"),
            BusinessPurpose::TransactionManagement
        );
        assert_eq!(
            BusinessPurpose::classify("Loan"),
            BusinessPurpose::FinancialServices
        );
        assert_eq!(
            BusinessPurpose::classify("Branch"),
            BusinessPurpose::OrganizationalManagement
        );
        assert_eq!(
            BusinessPurpose::classify("Inventory"),
            BusinessPurpose::ProductManagement
        );
        assert_eq!(
            BusinessPurpose::classify("Settings"),
            BusinessPurpose::GeneralPurpose
        );
    }

    #[tokio::test]
    async fn test_profile_detects_enums_and_patterns() {
        let adapter = MockAdapter::with_schema(banking_schema())
            .with_result(
                "COUNT(*)",
                QueryResult::with_data(
                    vec![ColumnInfo::new("count", "INTEGER")],
                    vec![vec![Value::Int(3)]],
                ),
            )
            .with_result(
                "DISTINCT \"AccountType\"",
                enum_result(&["CHECKING", "SAVINGS", "BUSINESS"]),
            )
            .with_result("DISTINCT \"Status\"", enum_result(&["ACTIVE", "CLOSED"]));

        let schema = banking_schema();
        let profile = SchemaProfile::build(&adapter, &schema).await.unwrap();

        let account = &profile.tables["Account"];
        assert_eq!(account.row_count, 3);
        assert_eq!(
            account.detected_enums["AccountType"],
            vec!["CHECKING", "SAVINGS", "BUSINESS"]
        );
        assert_eq!(account.detected_enums["Status"], vec!["ACTIVE", "CLOSED"]);

        assert_eq!(profile.summary.total_tables, 2);
        assert!(profile
            .summary
            .key_patterns
            .contains(&"uses_id_pattern".to_string()));
        assert!(profile
            .summary
            .key_patterns
            .contains(&"includes_temporal_data".to_string()));
        assert!(profile
            .summary
            .key_patterns
            .contains(&"uses_status_fields".to_string()));
        assert!(profile
            .summary
            .key_patterns
            .contains(&"has_relationships".to_string()));
    }

    #[tokio::test]
    async fn test_wide_text_column_is_not_an_enum() {
        let many: Vec<String> = (0..16).map(|i| format!("value-{i}")).collect();
        let many_refs: Vec<&str> = many.iter().map(String::as_str).collect();

        let adapter = MockAdapter::with_schema(banking_schema())
            .with_result("DISTINCT \"AccountType\"", enum_result(&many_refs));

        let schema = banking_schema();
        let profile = SchemaProfile::build(&adapter, &schema).await.unwrap();

        assert!(!profile.tables["Account"]
            .detected_enums
            .contains_key("AccountType"));
    }

    #[tokio::test]
    async fn test_estimated_domain_is_most_common_purpose() {
        let schema = Schema {
            tables: vec![
                Table::new("Loan"),
                Table::new("CreditCard"),
                Table::new("Branch"),
            ],
            foreign_keys: vec![],
        };
        let adapter = MockAdapter::with_schema(schema.clone());
        let profile = SchemaProfile::build(&adapter, &schema).await.unwrap();

        assert_eq!(profile.summary.estimated_domain, "financial_services");
    }

    #[tokio::test]
    async fn test_tables_by_importance_prefers_connected_tables() {
        let schema = banking_schema();
        let adapter = MockAdapter::with_schema(schema.clone());
        let profile = SchemaProfile::build(&adapter, &schema).await.unwrap();

        // Loan carries the foreign key, so it outranks Account.
        assert_eq!(profile.tables_by_importance()[0], "Loan");
    }
}
