//! Auto prompt generation from a schema profile.
//!
//! Produces a domain-specific system prompt for databases that are not the
//! known banking schema: domain analysis, table descriptions, security
//! rules, example queries, enum documentation and join patterns, assembled
//! into one prompt. Every LLM-assisted step has a deterministic fallback,
//! so generation always succeeds even with no LLM configured.

use crate::db::SchemaProfile;
use crate::llm::{LlmClient, Message};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest accepted LLM-generated table description.
const MAX_DESCRIPTION_LEN: usize = 300;

/// Column-name fragments that mark a column as sensitive.
const SENSITIVE_PATTERNS: &[&str] = &["password", "ssn", "tax", "credit", "card"];

/// What the database appears to be about.
#[derive(Debug, Clone)]
struct DomainAnalysis {
    primary_domain: String,
    description: String,
}

/// Generates domain prompts from schema profiles.
#[derive(Default)]
pub struct PromptGenerator {
    llm: Option<Arc<dyn LlmClient>>,
}

impl PromptGenerator {
    /// A generator with no LLM: every step uses its deterministic path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator that asks the LLM to enrich descriptions and examples.
    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm: Some(llm) }
    }

    /// Generates the complete domain prompt for a profile.
    pub async fn generate(&self, profile: &SchemaProfile) -> String {
        let domain = self.analyze_domain(profile).await;
        let descriptions = self.describe_tables(profile).await;
        let security_rules = security_rules(profile);
        let examples = self.example_queries(profile).await;
        let enums = enum_documentation(profile);
        let patterns = join_patterns(profile);

        assemble(
            profile,
            &domain,
            &descriptions,
            &security_rules,
            &examples,
            &enums,
            &patterns,
        )
    }

    async fn analyze_domain(&self, profile: &SchemaProfile) -> DomainAnalysis {
        let primary_domain = estimate_domain(profile);
        let fallback_description = format!("A {} system", primary_domain.replace('_', " "));

        let Some(llm) = &self.llm else {
            return DomainAnalysis {
                primary_domain,
                description: fallback_description,
            };
        };

        let table_names: Vec<&str> = profile.tables.keys().map(String::as_str).collect();
        let prompt = format!(
            "This database has tables: {}. Its estimated domain is {}. \
             In one sentence, describe what this system manages.",
            table_names.join(", "),
            primary_domain
        );
        match llm.complete(&[Message::user(prompt)]).await {
            Ok(description) => DomainAnalysis {
                primary_domain,
                description: clip(description.trim().replace('\n', " "), MAX_DESCRIPTION_LEN),
            },
            Err(e) => {
                warn!(error = %e, "LLM domain analysis failed, using fallback");
                DomainAnalysis {
                    primary_domain,
                    description: fallback_description,
                }
            }
        }
    }

    async fn describe_tables(&self, profile: &SchemaProfile) -> BTreeMap<String, String> {
        let Some(llm) = &self.llm else {
            return profile
                .tables
                .iter()
                .map(|(name, table)| (name.clone(), fallback_description(name, table)))
                .collect();
        };

        let requests = profile.tables.iter().map(|(name, table)| {
            let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
            let prompt = format!(
                "Table {} ({} rows) has columns: {}. Business purpose: {}. \
                 In 1-2 sentences, describe what this table stores.",
                name,
                table.row_count,
                columns.join(", "),
                table.business_purpose.as_str()
            );
            let llm = Arc::clone(llm);
            async move { (name.clone(), llm.complete(&[Message::user(prompt)]).await) }
        });

        join_all(requests)
            .await
            .into_iter()
            .map(|(name, result)| {
                let description = match result {
                    Ok(text) => clip(text.trim().replace('\n', " "), MAX_DESCRIPTION_LEN),
                    Err(e) => {
                        debug!(table = %name, error = %e, "Table description failed");
                        fallback_description(&name, &profile.tables[&name])
                    }
                };
                (name, description)
            })
            .collect()
    }

    async fn example_queries(&self, profile: &SchemaProfile) -> Vec<ExampleQuery> {
        let mut examples = Vec::new();

        for name in profile.tables_by_importance().into_iter().take(3) {
            let table = &profile.tables[name];

            if let Some(llm) = &self.llm {
                let columns: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
                let prompt = format!(
                    "Write one example for table {} with columns {}. Respond in exactly this format:\n\
                     User Question: \"...\"\n\
                     SQL Query: SELECT ... FROM {} WHERE ... = :parameter_name\n\
                     Explanation: ...",
                    name,
                    columns.join(", "),
                    name
                );
                match llm.complete(&[Message::user(prompt)]).await {
                    Ok(response) => {
                        if let Some(example) = parse_example(&response) {
                            examples.push(example);
                            continue;
                        }
                    }
                    Err(e) => debug!(table = name, error = %e, "Example generation failed"),
                }
            }

            examples.push(fallback_example(name, table));
        }

        examples
    }
}

/// A worked question/query pair for the EXAMPLE QUERIES section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleQuery {
    pub user_question: String,
    pub sql_query: String,
    pub explanation: String,
}

fn estimate_domain(profile: &SchemaProfile) -> String {
    let names = profile
        .tables
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let matches = |words: &[&str]| words.iter().any(|w| names.contains(w));

    if matches(&["account", "bank", "loan", "credit"]) {
        "financial_services".to_string()
    } else if matches(&["order", "product", "inventory", "cart"]) {
        "e_commerce".to_string()
    } else if matches(&["patient", "doctor", "medical", "treatment"]) {
        "healthcare".to_string()
    } else if profile.summary.estimated_domain != "general_purpose" {
        profile.summary.estimated_domain.clone()
    } else {
        "general_business".to_string()
    }
}

fn fallback_description(name: &str, table: &crate::db::TableProfile) -> String {
    format!(
        "Table storing {} data with {} columns.",
        name.to_lowercase().replace('_', " "),
        table.columns.len()
    )
}

fn security_rules(profile: &SchemaProfile) -> Vec<String> {
    let mut rules = vec![
        "Only SELECT statements allowed, never INSERT/UPDATE/DELETE".to_string(),
        "Never return data belonging to other users".to_string(),
        "Always use named parameters (:name) to prevent SQL injection".to_string(),
        "Mask sensitive data like card numbers, keeping only the last four digits".to_string(),
        "Filter data based on the caller's user context".to_string(),
    ];

    for (table_name, table) in &profile.tables {
        for column in &table.columns {
            let lower = column.name.to_lowercase();
            if SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
                rules.push(format!(
                    "Treat {}.{} as sensitive; never return it unmasked",
                    table_name, column.name
                ));
            } else if lower.contains("email") {
                rules.push(format!(
                    "{}.{} is PII; return it only when the question requires it",
                    table_name, column.name
                ));
            }
        }
    }

    rules.truncate(10);
    rules
}

fn fallback_example(name: &str, table: &crate::db::TableProfile) -> ExampleQuery {
    let filter_column = table
        .foreign_keys
        .first()
        .map(|fk| fk.from_column.clone())
        .or_else(|| table.primary_keys.first().cloned())
        .unwrap_or_else(|| "id".to_string());

    ExampleQuery {
        user_question: format!("Show my {} records", name.to_lowercase()),
        sql_query: format!(
            "SELECT * FROM {name} WHERE {filter_column} = :{filter_column}"
        ),
        explanation: format!("Filters {name} rows by the caller's {filter_column}."),
    }
}

fn parse_example(response: &str) -> Option<ExampleQuery> {
    let field = |label: &str| {
        response.lines().find_map(|line| {
            line.trim()
                .strip_prefix(label)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|rest| rest.trim().trim_matches('"').to_string())
        })
    };

    let user_question = field("User Question")?;
    let sql_query = field("SQL Query")?;
    if user_question.is_empty() || sql_query.is_empty() {
        return None;
    }
    Some(ExampleQuery {
        user_question,
        sql_query,
        explanation: field("Explanation").unwrap_or_default(),
    })
}

fn enum_documentation(profile: &SchemaProfile) -> BTreeMap<String, Vec<String>> {
    let mut enums = BTreeMap::new();
    for (table_name, table) in &profile.tables {
        for (column, values) in &table.detected_enums {
            enums.insert(format!("{table_name}.{column}"), values.clone());
        }
    }
    enums
}

fn join_patterns(profile: &SchemaProfile) -> Vec<String> {
    let mut patterns: Vec<String> = profile
        .relationships
        .iter()
        .take(5)
        .map(|rel| {
            format!(
                "Get {} with related {}: SELECT * FROM {} t1 JOIN {} t2 ON t1.{} = t2.{} WHERE t1.{} = :id",
                rel.from_table.to_lowercase(),
                rel.to_table.to_lowercase(),
                rel.from_table,
                rel.to_table,
                rel.from_column,
                rel.to_column,
                rel.from_column
            )
        })
        .collect();

    if estimate_domain(profile) == "financial_services" {
        patterns.push(
            "Get recent activity: filter by the caller's identifier and order by the date column descending"
                .to_string(),
        );
    }

    patterns
}

fn assemble(
    profile: &SchemaProfile,
    domain: &DomainAnalysis,
    descriptions: &BTreeMap<String, String>,
    security_rules: &[String],
    examples: &[ExampleQuery],
    enums: &BTreeMap<String, Vec<String>>,
    patterns: &[String],
) -> String {
    let mut prompt = format!(
        "You are an expert SQL assistant for a {} system. You translate the \
         user's question into exactly one read-only SQL SELECT statement for \
         the database described below.\n\n\
         Respond with the SQL inside a ```sql code fence. Use named parameters \
         with a colon prefix (:parameter_name) for every user identifier.\n\n\
         ## DATABASE SCHEMA\n\n\
         **Domain**: {}\n**Description**: {}\n\n**Tables and Structure:**\n\n",
        domain.primary_domain.replace('_', " "),
        domain.primary_domain.replace('_', " "),
        domain.description
    );

    for (table_name, table) in &profile.tables {
        let description = descriptions
            .get(table_name)
            .map(String::as_str)
            .unwrap_or("Data table");
        prompt.push_str(&format!("**{table_name}** - {description}\n"));

        for column in &table.columns {
            let nullable = if column.is_nullable { "NULL" } else { "NOT NULL" };
            let pk = if table.primary_keys.contains(&column.name) {
                " (PRIMARY KEY)"
            } else {
                ""
            };
            let default = column
                .default
                .as_ref()
                .map(|d| format!(" DEFAULT {d}"))
                .unwrap_or_default();
            prompt.push_str(&format!(
                "  - {} {} {}{}{}\n",
                column.name, column.data_type, nullable, default, pk
            ));
        }

        if !table.foreign_keys.is_empty() {
            prompt.push_str("  Foreign Keys:\n");
            for fk in &table.foreign_keys {
                prompt.push_str(&format!(
                    "    - {} -> {}.{}\n",
                    fk.from_column, fk.to_table, fk.to_column
                ));
            }
        }
        prompt.push('\n');
    }

    if !enums.is_empty() {
        prompt.push_str("**System Codes and Enum Values:**\n");
        for (key, values) in enums {
            prompt.push_str(&format!("- {}: {:?}\n", key, values));
        }
        prompt.push('\n');
    }

    prompt.push_str("## SECURITY RULES\n\n");
    for rule in security_rules {
        prompt.push_str(&format!("- {rule}\n"));
    }
    prompt.push('\n');

    if !examples.is_empty() {
        prompt.push_str("## EXAMPLE QUERIES\n\n");
        for (i, example) in examples.iter().enumerate() {
            prompt.push_str(&format!(
                "**Example {}: {}**\n```sql\n{}\n```\n",
                i + 1,
                example.user_question,
                example.sql_query
            ));
            if !example.explanation.is_empty() {
                prompt.push_str(&format!("{}\n", example.explanation));
            }
            prompt.push('\n');
        }
    }

    if !patterns.is_empty() {
        prompt.push_str("**Common Query Patterns:**\n");
        for pattern in patterns {
            prompt.push_str(&format!("- {pattern}\n"));
        }
    }

    prompt
}

fn clip(text: String, max_len: usize) -> String {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, ForeignKey, MockAdapter, Schema, Table};
    use crate::llm::MockLlmClient;

    async fn shop_profile() -> SchemaProfile {
        let schema = Schema {
            tables: vec![
                Table {
                    name: "orders".to_string(),
                    columns: vec![
                        Column::new("order_id", "INTEGER").nullable(false),
                        Column::new("customer_email", "VARCHAR(100)"),
                        Column::new("status", "VARCHAR(20)"),
                    ],
                    primary_key: vec!["order_id".to_string()],
                },
                Table {
                    name: "order_items".to_string(),
                    columns: vec![
                        Column::new("item_id", "INTEGER").nullable(false),
                        Column::new("order_id", "INTEGER").nullable(false),
                    ],
                    primary_key: vec!["item_id".to_string()],
                },
            ],
            foreign_keys: vec![ForeignKey::new(
                "order_items",
                "order_id",
                "orders",
                "order_id",
            )],
        };
        let adapter = MockAdapter::with_schema(schema.clone());
        SchemaProfile::build(&adapter, &schema).await.unwrap()
    }

    #[tokio::test]
    async fn test_deterministic_generation_without_llm() {
        let profile = shop_profile().await;
        let prompt = PromptGenerator::new().generate(&profile).await;

        assert!(prompt.contains("e commerce system"));
        assert!(prompt.contains("**orders**"));
        assert!(prompt.contains("order_id INTEGER NOT NULL (PRIMARY KEY)"));
        assert!(prompt.contains("## SECURITY RULES"));
        assert!(prompt.contains("Only SELECT statements allowed"));
        assert!(prompt.contains("orders.customer_email is PII"));
        assert!(prompt.contains("JOIN orders t2 ON t1.order_id = t2.order_id"));
    }

    #[tokio::test]
    async fn test_fallback_example_uses_foreign_key() {
        let profile = shop_profile().await;
        let prompt = PromptGenerator::new().generate(&profile).await;

        // order_items carries the FK, so it leads the examples.
        assert!(prompt.contains("SELECT * FROM order_items WHERE order_id = :order_id"));
    }

    #[tokio::test]
    async fn test_llm_description_is_used() {
        let profile = shop_profile().await;
        let llm = Arc::new(
            MockLlmClient::new()
                .with_response("describe what this table stores", "Tracks customer orders."),
        );
        let prompt = PromptGenerator::with_llm(llm).generate(&profile).await;

        assert!(prompt.contains("Tracks customer orders."));
    }

    #[test]
    fn test_parse_example() {
        let response = "User Question: \"What did I order?\"\nSQL Query: SELECT * FROM orders WHERE order_id = :order_id\nExplanation: Looks up one order.";
        let example = parse_example(response).unwrap();
        assert_eq!(example.user_question, "What did I order?");
        assert!(example.sql_query.starts_with("SELECT"));
        assert_eq!(example.explanation, "Looks up one order.");
    }

    #[test]
    fn test_parse_example_rejects_incomplete() {
        assert!(parse_example("Explanation: nothing else").is_none());
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        let text = "ab\u{00e9}".repeat(200);
        let clipped = clip(text, 300);
        assert!(clipped.ends_with("..."));
        assert!(clipped.len() <= 303);
    }
}
