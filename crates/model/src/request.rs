use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The learner.
    User,
    /// The tutoring bot.
    Assistant,
    /// Instructions for the bot.
    System,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The text of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message written by the learner.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a message written by the bot.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates a system instruction message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A request to be sent to the chat provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChatRequest {
    /// The conversation so far, ending with the new user message.
    pub messages: Vec<ChatMessage>,
    /// The system prompt for the bot persona.
    pub system_prompt: String,
    /// The thread identifier returned by a previous turn, if any.
    pub thread_id: Option<String>,
}
