//! System prompt construction.
//!
//! Three sources feed the system prompt: the static banking prompt (when
//! the connected database is the known banking schema), live schema text,
//! and an auto-generated domain prompt for unknown schemas, cached on disk
//! by schema hash.

pub mod banking;
pub mod cache;
pub mod generator;

pub use banking::{banking_system_prompt, is_banking_schema};
pub use cache::{CachedPrompt, PromptCache};
pub use generator::PromptGenerator;

/// Appends live schema text to a base prompt so the model can verify the
/// exact table and column names.
pub fn with_live_schema(base: &str, schema_text: &str) -> String {
    format!(
        "{base}\n\n## LIVE SCHEMA\n\n\
         The connected database reports this structure; use these exact \
         table and column names:\n\n{schema_text}\n"
    )
}
