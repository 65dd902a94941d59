use serde::Serialize;

use crate::config::Config;
use crate::model::options::GenerationOptions;
use crate::web::models::{ChatRequest, Message};

/// Build the outward message sequence: policy first, then history, then the new message.
///
/// An empty policy still produces an (empty) system message.
pub fn assemble_messages(policy: &str, history: &[Message], message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(policy));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(message));
    messages
}

/// Payload for Ollama's `/api/chat`.
#[derive(Debug, Serialize)]
pub struct BackendRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    pub options: GenerationOptions,
}

impl BackendRequest {
    pub fn from_turn(turn: &ChatRequest, config: &Config, stream: bool) -> Self {
        Self {
            model: config.model_name.clone(),
            messages: assemble_messages(&turn.character_policy, turn.history(), &turn.message),
            stream,
            options: GenerationOptions::normalize(
                turn.temperature,
                turn.max_tokens,
                turn.context_length,
                config,
            ),
        }
    }
}
