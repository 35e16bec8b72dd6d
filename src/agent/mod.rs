//! The DBA agent: natural language in, safe query results out.
//!
//! One turn runs a fixed pipeline: build (or reuse) the system prompt,
//! ask the LLM for SQL, extract and gate the statement, bind parameters
//! exclusively from the caller's user context, execute through the
//! read-only server, mask card numbers, and synthesize an answer.

use crate::bind;
use crate::context::{is_card_column, mask_card_number, UserContext};
use crate::db::{QueryResult, SchemaProfile, Value};
use crate::error::{PilotError, Result};
use crate::llm::{extract_sql, Conversation, LlmClient, Message};
use crate::prompt::{
    banking_system_prompt, is_banking_schema, with_live_schema, PromptCache, PromptGenerator,
};
use crate::safety::ensure_read_only;
use crate::server::ReadOnlyServer;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Result of one agent turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// The SQL that was executed, with named parameters as generated.
    pub sql: String,
    /// Query results, with card numbers masked.
    pub result: QueryResult,
    /// Natural-language answer synthesized from the results.
    pub answer: String,
}

/// A natural-language DBA assistant bound to one database connection.
pub struct DbaAgent {
    server: Arc<ReadOnlyServer>,
    llm: Arc<dyn LlmClient>,
    prompt_cache: Mutex<PromptCache>,
    system_prompt: RwLock<Option<String>>,
    history: Mutex<Conversation>,
}

impl DbaAgent {
    pub fn new(
        server: Arc<ReadOnlyServer>,
        llm: Arc<dyn LlmClient>,
        prompt_cache: PromptCache,
    ) -> Self {
        Self {
            server,
            llm,
            prompt_cache: Mutex::new(prompt_cache),
            system_prompt: RwLock::new(None),
            history: Mutex::new(Conversation::new()),
        }
    }

    /// Answers a question, scoped to the given user context.
    pub async fn query_with_context(
        &self,
        question: &str,
        user_context: &UserContext,
    ) -> Result<AgentReply> {
        let system_prompt = self.system_prompt().await?;

        let user_message = if user_context.is_empty() {
            question.to_string()
        } else {
            format!("{question}\n\nCaller context: {user_context}")
        };
        let mut messages = vec![Message::system(system_prompt)];
        messages.extend_from_slice(self.history.lock().await.messages());
        messages.push(Message::user(user_message.clone()));

        let response = self.llm.complete(&messages).await?;
        let parsed = extract_sql(&response);
        let Some(sql) = parsed.sql else {
            return Err(PilotError::llm(format!(
                "Model did not produce a SQL statement: {}",
                parsed.text
            )));
        };
        info!(sql = %sql, "Generated SQL");

        ensure_read_only(&sql)?;

        // Bind values come only from the caller's context; a query naming
        // an identifier this caller cannot supply is rejected here.
        let (_, params) = bind::rewrite_placeholders(&sql, self.server.backend());
        let values = user_context.bind_values(&params)?;
        debug!(params = params.len(), context = %user_context, "Executing with caller context");

        let mut result = self.server.execute_bound(&sql, &values).await?;
        mask_card_columns(&mut result);

        let answer = self.synthesize_answer(question, &result).await;

        let mut history = self.history.lock().await;
        history.add_user(user_message);
        history.add_assistant(answer.clone());
        drop(history);

        Ok(AgentReply {
            sql,
            result,
            answer,
        })
    }

    /// Analyzes the bind parameters of a statement against the live schema.
    pub async fn analyze_bind_parameters(&self, sql: &str) -> Result<bind::BindAnalysis> {
        self.server.analyze_bind_parameters(sql).await
    }

    /// Returns the system prompt, building it on first use.
    ///
    /// The known banking schema gets the static prompt; anything else gets
    /// a generated domain prompt, cached on disk by schema hash.
    async fn system_prompt(&self) -> Result<String> {
        if let Some(prompt) = self.system_prompt.read().await.as_ref() {
            return Ok(prompt.clone());
        }

        let mut guard = self.system_prompt.write().await;
        if let Some(prompt) = guard.as_ref() {
            return Ok(prompt.clone());
        }

        let schema = self.server.get_schema().await?;
        let prompt = if is_banking_schema(schema.as_ref()) {
            info!("Known banking schema detected, using the static prompt");
            with_live_schema(&banking_system_prompt(), &schema.format_for_llm())
        } else {
            let schema_hash = schema.content_hash();
            let mut cache = self.prompt_cache.lock().await;
            if let Some(cached) = cache.get(&schema_hash) {
                info!(domain = %cached.domain, "Using cached domain prompt");
                cached.prompt.clone()
            } else {
                info!("Generating domain prompt from schema profile");
                let profile =
                    SchemaProfile::build(self.server.adapter().as_ref(), schema.as_ref()).await?;
                let generated = PromptGenerator::with_llm(Arc::clone(&self.llm))
                    .generate(&profile)
                    .await;
                cache.put(
                    &schema_hash,
                    &generated,
                    &profile.summary.estimated_domain,
                    profile.summary.total_tables,
                )?;
                generated
            }
        };

        *guard = Some(prompt.clone());
        Ok(prompt)
    }

    /// Turns query results into a short natural-language answer. An LLM
    /// failure degrades to a plain row-count summary rather than failing
    /// the turn.
    async fn synthesize_answer(&self, question: &str, result: &QueryResult) -> String {
        let fallback = || {
            if result.is_empty() {
                "The query returned no rows.".to_string()
            } else {
                format!("The query returned {} row(s).", result.row_count)
            }
        };

        let rows = serde_json::to_string(&result.to_row_mappings()).unwrap_or_default();
        let messages = vec![
            Message::system(
                "You answer a user's database question from query results. \
                 Be concise and do not invent values that are not in the results.",
            ),
            Message::user(format!(
                "Question: {question}\n\nQuery results (JSON):\n{rows}"
            )),
        ];

        match self.llm.complete(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Answer synthesis failed, returning summary");
                fallback()
            }
        }
    }
}

/// Masks card numbers in any result column that holds them.
fn mask_card_columns(result: &mut QueryResult) {
    let card_columns: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .filter(|(_, col)| is_card_column(&col.name))
        .map(|(i, _)| i)
        .collect();
    if card_columns.is_empty() {
        return;
    }

    for row in &mut result.rows {
        for &index in &card_columns {
            if let Some(Value::String(raw)) = row.get(index) {
                row[index] = Value::String(mask_card_number(raw));
            }
        }
    }
}
