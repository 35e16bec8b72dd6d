//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::error::{PilotError, Result};
use crate::llm::{
    GeminiClient, GeminiConfig, LlmClient, LlmProvider, MockLlmClient, OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client for the given provider.
///
/// If `api_key` is provided, it takes precedence over environment variables.
/// Otherwise keys are resolved from the environment: `OPENAI_API_KEY` for
/// OpenAI, `GEMINI_API_KEY` or `VERTEX_PROJECT`/`VERTEX_LOCATION` for Gemini.
///
/// Model selection is controlled by environment variables:
/// - `OPENAI_MODEL` (defaults to "gpt-4o")
/// - `GEMINI_MODEL` (defaults to "gemini-2.0-flash")
pub fn create_client(provider: LlmProvider, api_key: Option<String>) -> Result<Box<dyn LlmClient>> {
    match provider {
        LlmProvider::OpenAi => {
            let key = api_key
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    PilotError::llm("No API key configured. Set OPENAI_API_KEY.")
                })?;
            let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
            Ok(Box::new(OpenAiClient::new(OpenAiConfig::new(key, model))?))
        }
        LlmProvider::Gemini => match api_key {
            Some(key) => {
                let model = std::env::var("GEMINI_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash".to_string());
                Ok(Box::new(GeminiClient::new(GeminiConfig::with_api_key(
                    key, model,
                ))?))
            }
            None => Ok(Box::new(GeminiClient::from_env()?)),
        },
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}
