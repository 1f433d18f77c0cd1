//! Generative-text proxy.
//!
//! Stateless: every request carries its own prompt inputs or chat
//! transcript, and nothing is kept between requests.

pub mod gemini;
pub mod prompts;
pub mod routes;

pub use gemini::GeminiGenerator;
pub use prompts::{AssistAction, render, render_chat};
pub use routes::{AssistRouteState, assist_routes};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AssistConfig;
use crate::error::LlmError;

/// Speaker of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    #[serde(alias = "assistant")]
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

/// A fully rendered request for the upstream model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
}

/// Upstream text model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// Build the configured generator, or `None` when no API key is set.
pub fn create_generator(config: &AssistConfig) -> Option<Arc<dyn TextGenerator>> {
    let Some(api_key) = config.api_key.clone() else {
        tracing::warn!("GEMINI_API_KEY not set, assist endpoint will answer with a configuration error");
        return None;
    };
    tracing::info!("Using Gemini (model: {})", config.model);
    Some(Arc::new(GeminiGenerator::new(api_key, &config.model)))
}
