//! Gemini LLM client implementation.
//!
//! Implements the LlmClient trait for Google's Gemini models, reachable
//! either through the public Generative Language API (API key) or through
//! Vertex AI (project + location + OAuth access token).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PilotError, Result};
use crate::llm::types::{Message, Role};
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default model when none is configured.
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Maximum number of retry attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// How the client authenticates and where it sends requests.
#[derive(Debug, Clone)]
pub enum GeminiEndpoint {
    /// Public Generative Language API, authenticated with an API key.
    ApiKey(String),
    /// Vertex AI, authenticated with an OAuth access token.
    Vertex {
        project: String,
        location: String,
        access_token: String,
    },
}

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Endpoint and credentials.
    pub endpoint: GeminiEndpoint,
    /// Model to use (e.g., "gemini-2.0-flash").
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl GeminiConfig {
    /// Creates a config for the public API with the given key and model.
    pub fn with_api_key(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: GeminiEndpoint::ApiKey(api_key.into()),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Creates a config for Vertex AI.
    pub fn with_vertex(
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: GeminiEndpoint::Vertex {
                project: project.into(),
                location: location.into(),
                access_token: access_token.into(),
            },
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// The generateContent URL for this configuration.
    fn request_url(&self) -> String {
        match &self.endpoint {
            GeminiEndpoint::ApiKey(_) => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            ),
            GeminiEndpoint::Vertex {
                project, location, ..
            } => format!(
                "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{}:generateContent",
                self.model
            ),
        }
    }
}

/// Gemini LLM client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    /// Creates a new Gemini client with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PilotError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Creates a client from environment variables.
    ///
    /// Prefers `GEMINI_API_KEY`; falls back to Vertex AI via
    /// `VERTEX_PROJECT` + `VERTEX_LOCATION` + `VERTEX_ACCESS_TOKEN`.
    /// Optionally reads `GEMINI_MODEL` for the model.
    pub fn from_env() -> Result<Self> {
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
            return Self::new(GeminiConfig::with_api_key(api_key, model));
        }

        let project = std::env::var("VERTEX_PROJECT");
        let location = std::env::var("VERTEX_LOCATION");
        if let (Ok(project), Ok(location)) = (project, location) {
            let token = std::env::var("VERTEX_ACCESS_TOKEN").map_err(|_| {
                PilotError::llm(
                    "VERTEX_ACCESS_TOKEN not set (required with VERTEX_PROJECT/VERTEX_LOCATION)",
                )
            })?;
            return Self::new(GeminiConfig::with_vertex(project, location, token, model));
        }

        Err(PilotError::llm(
            "No Gemini credentials: set GEMINI_API_KEY, or VERTEX_PROJECT and VERTEX_LOCATION",
        ))
    }

    /// Extracts the system instruction and converts remaining messages to
    /// Gemini content blocks. Gemini uses "model" for assistant turns.
    fn convert_messages(messages: &[Message]) -> (Option<GeminiSystem>, Vec<GeminiContent>) {
        let mut system = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    system = Some(GeminiSystem {
                        parts: vec![GeminiPart {
                            text: msg.content.clone(),
                        }],
                    });
                }
                Role::User | Role::Assistant => {
                    contents.push(GeminiContent {
                        role: if msg.role == Role::User {
                            "user".to_string()
                        } else {
                            "model".to_string()
                        },
                        parts: vec![GeminiPart {
                            text: msg.content.clone(),
                        }],
                    });
                }
            }
        }

        (system, contents)
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (PilotError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return (
                PilotError::llm("Authentication failed. Check your Gemini credentials."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (
                PilotError::llm("Rate limited. Please wait and try again."),
                true, // Rate limits are retryable
            );
        }

        let is_retryable = status.is_server_error();

        if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(body) {
            return (
                PilotError::llm(format!(
                    "Gemini API error: {}",
                    error_response.error.message
                )),
                is_retryable,
            );
        }

        (
            PilotError::llm(format!("Gemini API error ({}): {}", status, body)),
            is_retryable,
        )
    }

    /// Determines if a request error is retryable.
    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }

    /// Extracts the candidate text from a successful response body.
    fn parse_success(body: &str) -> Result<String> {
        let response: GeminiResponse = serde_json::from_str(body)
            .map_err(|e| PilotError::llm(format!("Failed to parse response: {}", e)))?;

        let text = response
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(PilotError::llm("No response from Gemini"));
        }

        Ok(text)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let (system_instruction, contents) = Self::convert_messages(messages);

        let request = GeminiRequest {
            system_instruction,
            contents,
        };

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(
                "Gemini API request attempt {} of {}",
                attempt, MAX_RETRY_ATTEMPTS
            );

            let mut builder = self
                .client
                .post(self.config.request_url())
                .header("Content-Type", "application/json");
            builder = match &self.config.endpoint {
                GeminiEndpoint::ApiKey(key) => builder.header("x-goog-api-key", key),
                GeminiEndpoint::Vertex { access_token, .. } => {
                    builder.header("Authorization", format!("Bearer {}", access_token))
                }
            };

            match builder.json(&request).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| PilotError::llm(format!("Failed to read response: {}", e)))?;

                    if status.is_success() {
                        return Self::parse_success(&body);
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(
                        "Gemini API request failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, status
                    );
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable_request_error(&e);
                    let error = if e.is_timeout() {
                        PilotError::llm("Request timed out. Try again.")
                    } else if e.is_connect() {
                        PilotError::llm("Failed to connect to the Gemini API. Check your network.")
                    } else {
                        PilotError::llm(format!("Request failed: {}", e))
                    };
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(
                        "Gemini API request failed (attempt {}), retrying in {:?}",
                        attempt, delay
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2; // Exponential backoff
        }

        Err(last_error.expect("at least one attempt was made"))
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "system_instruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystem>,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiSystem {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_url() {
        let config = GeminiConfig::with_api_key("key", "gemini-2.0-flash");
        assert_eq!(
            config.request_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_vertex_url() {
        let config = GeminiConfig::with_vertex("my-proj", "us-central1", "token", "gemini-2.0-flash");
        assert_eq!(
            config.request_url(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/my-proj/locations/us-central1/publishers/google/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_convert_messages_separates_system() {
        let messages = vec![
            Message::system("You are a banking database assistant."),
            Message::user("What is my balance?"),
            Message::assistant("Your balance is $1,250.50."),
        ];

        let (system, contents) = GeminiClient::convert_messages(&messages);

        assert!(system.is_some());
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn test_parse_error_unauthorized() {
        let (error, is_retryable) = GeminiClient::parse_error(reqwest::StatusCode::FORBIDDEN, "");
        assert!(error.to_string().contains("Authentication failed"));
        assert!(!is_retryable);
    }

    #[test]
    fn test_parse_error_with_message() {
        let body = r#"{"error":{"message":"API key not valid","code":400}}"#;
        let (error, is_retryable) =
            GeminiClient::parse_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(error.to_string().contains("API key not valid"));
        assert!(!is_retryable);
    }

    #[test]
    fn test_parse_error_rate_limited_is_retryable() {
        let (error, is_retryable) =
            GeminiClient::parse_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(error.to_string().contains("Rate limited"));
        assert!(is_retryable);
    }

    #[test]
    fn test_parse_error_server_error_is_retryable() {
        let (_, is_retryable) =
            GeminiClient::parse_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(is_retryable);
    }

    #[test]
    fn test_parse_success_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"SELECT "},{"text":"1"}]}}]}"#;
        assert_eq!(GeminiClient::parse_success(body).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_parse_success_empty_candidates_is_error() {
        let body = r#"{"candidates":[]}"#;
        assert!(GeminiClient::parse_success(body).is_err());
    }

    #[test]
    fn test_config_with_timeout() {
        let config = GeminiConfig::with_api_key("key", "gemini-2.0-flash").with_timeout(60);
        assert_eq!(config.timeout_secs, 60);
    }
}
