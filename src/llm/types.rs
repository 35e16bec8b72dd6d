//! Message types for LLM communication.

use serde::{Deserialize, Serialize};

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message providing context and instructions.
    System,
    /// User message (human input).
    User,
    /// Assistant message (LLM response).
    Assistant,
}

impl Role {
    /// Returns the role as a string for API requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A conversation consisting of multiple messages.
///
/// The agent keeps recent question/answer exchanges here so follow-up
/// questions have context; old exchanges are dropped once the limit is
/// reached, while any leading system prompt is always preserved.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    /// Maximum number of user/assistant exchanges to keep.
    max_exchanges: usize,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_max_exchanges(10)
    }

    pub fn with_max_exchanges(max_exchanges: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_exchanges,
        }
    }

    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
        self.trim_to_limit();
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.add(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.add(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops the oldest user message (and its answer, if any) until the
    /// conversation holds at most `max_exchanges` user messages.
    fn trim_to_limit(&mut self) {
        let system_end = self
            .messages
            .iter()
            .position(|m| m.role != Role::System)
            .unwrap_or(self.messages.len());

        loop {
            let user_count = self.messages[system_end..]
                .iter()
                .filter(|m| m.role == Role::User)
                .count();
            if user_count <= self.max_exchanges {
                break;
            }

            let Some(oldest) = self.messages[system_end..]
                .iter()
                .position(|m| m.role == Role::User)
                .map(|i| i + system_end)
            else {
                break;
            };
            self.messages.remove(oldest);
            if self
                .messages
                .get(oldest)
                .is_some_and(|m| m.role == Role::Assistant)
            {
                self.messages.remove(oldest);
            }
        }
    }
}
