//! sqlpilot - ask questions about a database in plain language.

use anyhow::{anyhow, Context};
use sqlpilot::agent::DbaAgent;
use sqlpilot::cli::Cli;
use sqlpilot::config::{Config, ConnectionConfig};
use sqlpilot::context::UserContext;
use sqlpilot::db::QueryResult;
use sqlpilot::llm::{create_client, LlmProvider};
use sqlpilot::prompt::PromptCache;
use sqlpilot::server::ReadOnlyServer;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();
    if cli.log_to_file {
        sqlpilot::logging::init_file_logging();
    } else {
        sqlpilot::logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    let config = Config::load_from_file(&config_path)?;

    let connection = resolve_connection(&cli, &config)?
        .ok_or_else(|| anyhow!("No database connection configured. Use --help for usage."))?;
    info!("Connecting to {}", connection.display_string());

    let adapter = sqlpilot::db::connect(&connection).await?;
    let server = Arc::new(ReadOnlyServer::new(Arc::from(adapter)));

    if let Some(sql) = &cli.analyze {
        let analysis = server.analyze_bind_parameters(sql).await?;
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let provider: LlmProvider = cli
        .llm
        .as_deref()
        .unwrap_or(&config.llm.provider)
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let llm = create_client(provider, None)?;

    let agent = DbaAgent::new(Arc::clone(&server), Arc::from(llm), PromptCache::open_default()?);
    let user_context = cli.user_context();

    match &cli.question {
        Some(question) => {
            ask(&agent, question, &user_context, cli.show_sql).await?;
        }
        None => {
            interactive_loop(&agent, &server, &user_context, cli.show_sql).await?;
        }
    }

    Ok(())
}

/// Runs one question through the agent and prints the outcome.
async fn ask(
    agent: &DbaAgent,
    question: &str,
    user_context: &UserContext,
    show_sql: bool,
) -> anyhow::Result<()> {
    let reply = agent
        .query_with_context(question, user_context)
        .await
        .context("Query failed")?;

    if show_sql {
        println!("SQL: {}\n", reply.sql);
    }
    print_result(&reply.result);
    println!("{}", reply.answer);
    Ok(())
}

/// Reads questions from stdin until EOF or an exit command.
///
/// Besides questions, the session understands two commands: `schema`
/// prints the introspected schema, `refresh` re-introspects it.
async fn interactive_loop(
    agent: &DbaAgent,
    server: &ReadOnlyServer,
    user_context: &UserContext,
    show_sql: bool,
) -> anyhow::Result<()> {
    println!("sqlpilot interactive session. Type 'schema', 'refresh' or 'exit'.");

    let stdin = io::stdin();
    loop {
        print!("sqlpilot> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.eq_ignore_ascii_case("schema") {
            match server.get_schema_text().await {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("Error: {e}"),
            }
            continue;
        }
        if question.eq_ignore_ascii_case("refresh") {
            match server.refresh_schema().await {
                Ok(schema) => println!("Schema refreshed: {} table(s).", schema.tables.len()),
                Err(e) => eprintln!("Error: {e}"),
            }
            continue;
        }

        // One bad question should not end the session.
        if let Err(e) = ask(agent, question, user_context, show_sql).await {
            eprintln!("Error: {e:#}");
        }
    }

    Ok(())
}

/// Resolves the connection with fixed precedence: CLI connection string,
/// then CLI discrete flags, then a named config entry, then the config
/// default. Environment variables fill remaining gaps.
fn resolve_connection(cli: &Cli, config: &Config) -> anyhow::Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(anyhow!("Connection '{name}' not found in config file"));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

/// Prints a query result as an aligned text table.
fn print_result(result: &QueryResult) {
    if result.columns.is_empty() {
        return;
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.name.len()).collect();
    let rendered: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| v.to_display_string()).collect())
        .collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let header: Vec<String> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c.name, width = widths[i]))
        .collect();
    println!("{}", header.join(" | "));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));

    for row in &rendered {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect();
        println!("{}", line.join(" | "));
    }

    if result.was_truncated {
        println!("(results truncated at {} rows)", result.row_count);
    }
    println!();
}
