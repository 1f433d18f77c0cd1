//! REST endpoint for the generative-text proxy.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use super::prompts::{AssistAction, render, render_chat};
use super::{ChatTurn, TextGenerator};
use crate::error::LlmError;
use crate::identity::{TokenVerifier, bearer_token};
use crate::server::ApiError;

#[derive(Clone)]
pub struct AssistRouteState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub generator: Option<Arc<dyn TextGenerator>>,
}

#[derive(Debug, Deserialize)]
pub struct AssistRequest {
    pub action: AssistAction,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
}

/// POST /api/assist
async fn assist(
    State(state): State<AssistRouteState>,
    headers: HeaderMap,
    body: Result<Json<AssistRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state.verifier.verify(bearer_token(&headers)?)?;
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let generator = state
        .generator
        .as_ref()
        .ok_or_else(|| LlmError::NotConfigured("GEMINI_API_KEY is not set".to_string()))?;

    let request = match req.action {
        AssistAction::Chat => render_chat(&req.messages, req.context.as_deref())?,
        action => render(
            action,
            req.content.as_deref().unwrap_or_default(),
            req.context.as_deref(),
        )?,
    };

    let text = generator.generate(&request).await?;
    info!(subject = %identity.subject, action = %req.action, "Assist request served");
    Ok(Json(serde_json::json!({ "text": text })))
}

/// Build the assist REST routes.
pub fn assist_routes(state: AssistRouteState) -> Router {
    Router::new()
        .route("/api/assist", post(assist))
        .with_state(state)
}
