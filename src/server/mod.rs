//! HTTP/WebSocket surface.

mod admin;
mod errors;
mod session_routes;

pub use errors::ApiError;
pub use session_routes::SessionFrame;

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::assist::{AssistRouteState, TextGenerator, assist_routes};
use crate::identity::TokenVerifier;
use crate::onboarding::{OnboardingRouteState, OnboardingWriter, onboarding_routes};
use crate::profile::ProfileStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// `None` when no generative-text credential is configured.
    pub generator: Option<Arc<dyn TextGenerator>>,
}

/// Build the full router.
pub fn build_router(state: AppState) -> Router {
    let onboarding = OnboardingRouteState {
        writer: Arc::new(OnboardingWriter::new(
            Arc::clone(&state.verifier),
            Arc::clone(&state.store),
        )),
    };
    let assist = AssistRouteState {
        verifier: Arc::clone(&state.verifier),
        generator: state.generator.clone(),
    };

    Router::new()
        .route("/health", get(health))
        .merge(session_routes::session_routes(state.clone()))
        .merge(admin::admin_routes(state))
        .merge(onboarding_routes(onboarding))
        .merge(assist_routes(assist))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lifepoint"
    }))
}
