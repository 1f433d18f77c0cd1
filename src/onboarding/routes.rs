//! REST endpoint for onboarding submissions.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use super::model::{OnboardingSubmission, latest_calendar_date};
use super::writer::OnboardingWriter;
use crate::identity::bearer_token;
use crate::server::ApiError;

/// Headers a fronting proxy or CDN may set with the caller's country.
const COUNTRY_HEADERS: &[&str] = &["cf-ipcountry", "x-country"];

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub writer: Arc<OnboardingWriter>,
}

fn detected_country(headers: &HeaderMap) -> Option<String> {
    COUNTRY_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            // Cloudflare reports "XX" when it cannot tell.
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("xx"))
            .map(str::to_string)
    })
}

/// POST /api/onboarding
///
/// Body: `{dob, country?, selectedModules}`. Answers `{"success": true}`.
async fn submit_onboarding(
    State(state): State<OnboardingRouteState>,
    headers: HeaderMap,
    body: Result<Json<OnboardingSubmission>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // Auth failures take precedence over a malformed body.
    let identity = state.writer.authenticate(bearer_token(&headers)?)?;
    let Json(mut submission) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let has_country = submission
        .country
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if !has_country {
        submission.country = detected_country(&headers);
    }

    state
        .writer
        .submit_as(&identity, &submission, latest_calendar_date(Utc::now()))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding", post(submit_onboarding))
        .with_state(state)
}
