//! Onboarding: the one-time form a new identity completes before reaching
//! a dashboard.
//!
//! The submission is verified and validated in full before anything is
//! written; the write is a single create-or-merge of the caller's own
//! profile, so retries are safe.

pub mod model;
pub mod routes;
pub mod writer;

pub use model::{
    OnboardingSubmission, UNKNOWN_COUNTRY, ValidatedOnboarding, compute_age,
    latest_calendar_date, validate,
};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use writer::OnboardingWriter;
