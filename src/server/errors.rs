//! HTTP mapping for handler errors. Bodies are always `{"error": "..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::error::{AuthError, LlmError, OnboardingError, StoreError, ValidationError};

/// Error returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("{0}")]
    BadRequest(String),
}

impl From<OnboardingError> for ApiError {
    fn from(e: OnboardingError) -> Self {
        match e {
            OnboardingError::Auth(e) => Self::Auth(e),
            OnboardingError::Validation(e) => Self::Validation(e),
            OnboardingError::Store(e) => Self::Store(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::Forbidden) => StatusCode::FORBIDDEN,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Connection(_) | StoreError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Llm(LlmError::NotConfigured(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Llm(LlmError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            Self::Llm(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message shown to the client. Upstream and store internals stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Store(_) => "Profile store error, please retry".to_string(),
            Self::Llm(LlmError::NotConfigured(_) | LlmError::InvalidRequest(_)) => self.to_string(),
            Self::Llm(_) => "Text generation failed".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({ "error": self.public_message() })),
        )
            .into_response()
    }
}
