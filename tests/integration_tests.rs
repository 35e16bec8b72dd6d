//! End-to-end tests over an in-memory SQLite database.
//!
//! These run the full pipeline: schema introspection, prompt selection,
//! SQL generation (mocked), the safety gate, parameter binding from user
//! context, execution, and masking.

use sqlpilot::agent::DbaAgent;
use sqlpilot::bind;
use sqlpilot::context::UserContext;
use sqlpilot::db::{DatabaseAdapter, SqliteAdapter, Value};
use sqlpilot::llm::MockLlmClient;
use sqlpilot::prompt::PromptCache;
use sqlpilot::safety::ensure_read_only;
use sqlpilot::server::ReadOnlyServer;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

async fn banking_adapter() -> SqliteAdapter {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    for stmt in [
        "CREATE TABLE Person (
            PersonID INTEGER PRIMARY KEY,
            FirstName VARCHAR(50) NOT NULL,
            LastName VARCHAR(50) NOT NULL
        )",
        "CREATE TABLE Customer (
            CustomerID INTEGER PRIMARY KEY,
            PersonID INTEGER NOT NULL REFERENCES Person(PersonID),
            CustomerType VARCHAR(20) NOT NULL DEFAULT 'INDIVIDUAL'
        )",
        "CREATE TABLE Account (
            AccountID INTEGER PRIMARY KEY,
            CustomerID INTEGER NOT NULL REFERENCES Customer(CustomerID),
            AccountType VARCHAR(20) NOT NULL,
            Status VARCHAR(20) NOT NULL DEFAULT 'ACTIVE',
            Balance DECIMAL(10,2) NOT NULL DEFAULT 0
        )",
        "CREATE TABLE BankTransaction (
            TransactionID INTEGER PRIMARY KEY,
            AccountID INTEGER NOT NULL REFERENCES Account(AccountID),
            TransactionType VARCHAR(20) NOT NULL,
            Amount DECIMAL(10,2) NOT NULL
        )",
        "CREATE TABLE AccountCards (
            CardID INTEGER PRIMARY KEY,
            AccountID INTEGER NOT NULL REFERENCES Account(AccountID),
            CardNumber VARCHAR(20) NOT NULL,
            CardType VARCHAR(20) NOT NULL
        )",
        "INSERT INTO Person VALUES (1, 'Ada', 'Laurent'), (2, 'Ben', 'Okafor')",
        "INSERT INTO Customer VALUES (1, 1, 'INDIVIDUAL'), (2, 2, 'BUSINESS')",
        "INSERT INTO Account VALUES
            (10, 1, 'CHECKING', 'ACTIVE', 250.00),
            (11, 1, 'SAVINGS', 'ACTIVE', 900.00),
            (12, 2, 'BUSINESS', 'ACTIVE', 5400.00)",
        "INSERT INTO BankTransaction VALUES
            (100, 10, 'DEPOSIT', 250.00),
            (101, 12, 'WITHDRAWAL', 75.00)",
        "INSERT INTO AccountCards VALUES
            (1, 10, '4532015112830366', 'DEBIT'),
            (2, 12, '5425233430109903', 'CREDIT')",
    ] {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }

    SqliteAdapter::from_pool(pool)
}

fn agent_over(adapter: SqliteAdapter, llm: MockLlmClient) -> (DbaAgent, TempDir) {
    let dir = TempDir::new().unwrap();
    let cache = PromptCache::open(dir.path().join("prompts.json")).unwrap();
    let server = Arc::new(ReadOnlyServer::new(
        Arc::new(adapter) as Arc<dyn DatabaseAdapter>
    ));
    (DbaAgent::new(server, Arc::new(llm), cache), dir)
}

#[tokio::test]
async fn balance_question_returns_own_accounts_only() {
    let (agent, _dir) = agent_over(banking_adapter().await, MockLlmClient::new());

    let ctx = UserContext::new().with_customer_id(1);
    let reply = agent
        .query_with_context("What is my account balance?", &ctx)
        .await
        .unwrap();

    // Customer 1 has two accounts; customer 2's business account must not appear.
    assert_eq!(reply.result.row_count, 2);
    for row in &reply.result.rows {
        assert_ne!(row[0], Value::Int(12));
    }
}

#[tokio::test]
async fn context_isolation_binds_only_the_callers_values() {
    let (agent, _dir) = agent_over(banking_adapter().await, MockLlmClient::new());

    let reply_one = agent
        .query_with_context(
            "What is my balance?",
            &UserContext::new().with_customer_id(1),
        )
        .await
        .unwrap();
    let reply_two = agent
        .query_with_context(
            "What is my balance?",
            &UserContext::new().with_customer_id(2),
        )
        .await
        .unwrap();

    assert_eq!(reply_one.result.row_count, 2);
    assert_eq!(reply_two.result.row_count, 1);
    assert_eq!(reply_two.result.rows[0][0], Value::Int(12));
}

#[tokio::test]
async fn mutations_are_rejected_before_execution() {
    let (agent, _dir) = agent_over(banking_adapter().await, MockLlmClient::new());

    let ctx = UserContext::new().with_customer_id(1);
    let err = agent
        .query_with_context("Please close my account", &ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unsafe query rejected"));
}

#[tokio::test]
async fn card_numbers_come_back_masked() {
    let llm = MockLlmClient::new().with_response(
        "card",
        "```sql\nSELECT c.CardType, c.CardNumber FROM AccountCards c \
         JOIN Account a ON c.AccountID = a.AccountID \
         WHERE a.CustomerID = :CustomerID\n```",
    );
    let (agent, _dir) = agent_over(banking_adapter().await, llm);

    let reply = agent
        .query_with_context("Show my cards", &UserContext::new().with_customer_id(1))
        .await
        .unwrap();

    assert_eq!(reply.result.row_count, 1);
    assert_eq!(
        reply.result.rows[0][1],
        Value::String("XXXX-XXXX-XXXX-0366".to_string())
    );
}

#[tokio::test]
async fn read_query_binds_named_parameters() {
    let adapter = banking_adapter().await;
    let server = ReadOnlyServer::new(Arc::new(adapter) as Arc<dyn DatabaseAdapter>);

    let mut params = BTreeMap::new();
    params.insert("CustomerID".to_string(), Value::Int(2));
    let result = server
        .read_query(
            "SELECT AccountID, Balance FROM Account WHERE CustomerID = :CustomerID",
            &params,
        )
        .await
        .unwrap();

    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0][0], Value::Int(12));
}

#[tokio::test]
async fn read_query_refuses_mutations() {
    let adapter = banking_adapter().await;
    let server = ReadOnlyServer::new(Arc::new(adapter) as Arc<dyn DatabaseAdapter>);

    let err = server
        .read_query("DELETE FROM Account", &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unsafe query rejected"));

    let result = server
        .read_query("SELECT COUNT(*) AS n FROM Account", &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], Value::Int(3));
}

#[tokio::test]
async fn schema_for_llm_detects_enums_and_domain() {
    let adapter = banking_adapter().await;
    let server = ReadOnlyServer::new(Arc::new(adapter) as Arc<dyn DatabaseAdapter>);

    let profile_json = server.get_schema_for_llm().await.unwrap().to_string();

    assert!(profile_json.contains("Account"));
    assert!(profile_json.contains("CHECKING"));
    // Person/Customer/Account tables dominate the purpose vote.
    assert!(profile_json.contains("\"estimated_domain\":\"user_management\""));
    assert!(profile_json.contains("transaction_management"));
}

#[tokio::test]
async fn schema_hash_is_stable_across_introspections() {
    let adapter = banking_adapter().await;
    let first = adapter.introspect_schema().await.unwrap().content_hash();
    let second = adapter.introspect_schema().await.unwrap().content_hash();
    assert_eq!(first, second);
}

#[test]
fn named_parameters_survive_extraction_in_order() {
    let sql = "SELECT * FROM t WHERE a = :First AND b = :Second AND c = :First AND d = :Third";
    let analysis = bind::analyze_bind_parameters(sql, None);
    assert_eq!(analysis.named_parameters(), vec!["First", "Second", "Third"]);
}

#[test]
fn safety_gate_rejects_anything_but_select() {
    for sql in [
        "DELETE FROM Account",
        "UPDATE Account SET Balance = 0",
        "INSERT INTO Account VALUES (1)",
        "DROP TABLE Account",
        "SELECT 1; DELETE FROM Account",
        "not sql at all",
    ] {
        assert!(ensure_read_only(sql).is_err(), "accepted: {sql}");
    }

    assert!(ensure_read_only("SELECT * FROM Account").is_ok());
    assert!(ensure_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
}

// Live-database smoke test, skipped unless DATABASE_URL points somewhere.
#[tokio::test]
async fn live_database_runs_a_select() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };

    let config = sqlpilot::config::ConnectionConfig::from_connection_string(&url).unwrap();
    let adapter = sqlpilot::db::connect(&config).await.unwrap();
    let result = adapter.execute_query("SELECT 1", &[]).await.unwrap();
    assert_eq!(result.row_count, 1);
}
