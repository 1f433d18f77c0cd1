//! Error types for Lifepoint.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Profile store errors.
///
/// `Clone` because a failed subscription read is delivered to the session
/// driver as an ordinary notification value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Identity token errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Malformed Authorization header")]
    MalformedHeader,

    #[error("Invalid identity token: {0}")]
    InvalidToken(String),

    #[error("Identity token has expired")]
    Expired,

    #[error("Caller is not allowed to perform this action")]
    Forbidden,
}

/// Onboarding input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid date of birth: {0}")]
    InvalidDate(String),

    #[error("Date of birth {0} is in the future")]
    DateInFuture(String),

    #[error("At least one module must be selected")]
    NoModulesSelected,

    #[error("Invalid module identifier: {0:?}")]
    InvalidModule(String),
}

/// Onboarding submission errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Generative-text provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Generative text is not configured: {0}")]
    NotConfigured(String),

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider returned no text")]
    EmptyResponse,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
