use serde::Serialize;

use crate::config::Config;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 1.5;
pub const MIN_TOKENS: u32 = 32;
pub const MIN_CTX: u32 = 1024;

/// Generation options in Ollama's naming, always within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f64,
    /// Output-token budget.
    pub num_predict: u32,
    /// Context window size.
    pub num_ctx: u32,
}

impl GenerationOptions {
    /// Fill in defaults and clamp silently. Never fails.
    pub fn normalize(
        temperature: Option<f64>,
        max_tokens: Option<f64>,
        context_length: Option<f64>,
        config: &Config,
    ) -> Self {
        Self {
            temperature: normalize_temperature(temperature),
            num_predict: normalize_count(max_tokens, MIN_TOKENS, config.max_tokens),
            num_ctx: normalize_count(context_length, MIN_CTX, config.max_ctx),
        }
    }
}

fn normalize_temperature(temperature: Option<f64>) -> f64 {
    match temperature {
        Some(t) if !t.is_nan() => t.max(MIN_TEMPERATURE).min(MAX_TEMPERATURE),
        _ => DEFAULT_TEMPERATURE,
    }
}

// Absent and zero both mean "use the ceiling". Fractions are truncated.
fn normalize_count(value: Option<f64>, floor: u32, ceiling: u32) -> u32 {
    match value {
        Some(v) if v != 0.0 && !v.is_nan() => {
            v.max(f64::from(floor)).min(f64::from(ceiling)) as u32
        }
        _ => ceiling,
    }
}
