use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Largest context window the served model accepts.
pub const MODEL_MAX_CTX: u32 = 32768;
/// Largest output-token budget a single reply may request.
pub const MODEL_MAX_TOKENS: u32 = 4096;
/// Upper bound on a whole backend call, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Process-wide settings, built once in `main` and handed to every component.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub model_name: String,
    pub max_ctx: u32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            model_name: "mistral:7b-instruct-q4_0".to_string(),
            max_ctx: MODEL_MAX_CTX,
            max_tokens: MODEL_MAX_TOKENS,
            request_timeout: REQUEST_TIMEOUT,
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Config {
    /// Read the overridable settings from the environment.
    ///
    /// Ceilings and the call timeout are fixed and never read from here.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let ollama_base_url = env::var("OLLAMA_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.ollama_base_url);
        let model_name = env::var("MODEL_NAME").unwrap_or(defaults.model_name);
        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid PORT value: {raw}"))?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            ollama_base_url,
            model_name,
            host,
            port,
            ..Self::default()
        })
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.ollama_base_url)
    }

    pub fn tags_url(&self) -> String {
        format!("{}/api/tags", self.ollama_base_url)
    }
}
