use serde::{Deserialize, Serialize};

/// One inbound chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Echoed back on the unary path, never interpreted.
    pub character_name: String,
    /// The system prompt that defines the character.
    pub character_policy: String,
    pub message: String,
    #[serde(default)]
    pub conversation_history: Option<Vec<Message>>,
    pub temperature: Option<f64>,
    /// Any JSON number; clamped later, never rejected here.
    pub max_tokens: Option<f64>,
    pub context_length: Option<f64>,
}

impl ChatRequest {
    pub fn history(&self) -> &[Message] {
        self.conversation_history.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub character_name: String,
    pub model: String,
}

/// Utterance role. Anything outside the known three is carried through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
