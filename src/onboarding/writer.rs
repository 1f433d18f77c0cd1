//! OnboardingWriter: verifies the caller, validates the form, and merges
//! the result into the caller's own profile.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use super::model::{OnboardingSubmission, validate};
use crate::error::{AuthError, OnboardingError};
use crate::identity::{Identity, TokenVerifier};
use crate::profile::{Profile, ProfilePatch, ProfileStore};

pub struct OnboardingWriter {
    verifier: Arc<dyn TokenVerifier>,
    store: Arc<dyn ProfileStore>,
}

impl OnboardingWriter {
    pub fn new(verifier: Arc<dyn TokenVerifier>, store: Arc<dyn ProfileStore>) -> Self {
        Self { verifier, store }
    }

    /// Verify the caller's token. The returned identity is the only subject
    /// [`submit_as`](Self::submit_as) will write to.
    pub fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        self.verifier.verify(token)
    }

    /// Record a completed onboarding for the token's subject.
    ///
    /// Token and input are checked before the store is touched. The write
    /// itself is a single merge, so a retry with the same input converges on
    /// the same record and fields outside the form are preserved.
    pub async fn submit(
        &self,
        token: &str,
        submission: &OnboardingSubmission,
        today: NaiveDate,
    ) -> Result<Profile, OnboardingError> {
        let identity = self.authenticate(token)?;
        self.submit_as(&identity, submission, today).await
    }

    /// Validate and record a submission for an already verified identity.
    pub async fn submit_as(
        &self,
        identity: &Identity,
        submission: &OnboardingSubmission,
        today: NaiveDate,
    ) -> Result<Profile, OnboardingError> {
        let validated = validate(submission, today).inspect_err(|e| {
            debug!(subject = %identity.subject, error = %e, "Onboarding submission rejected");
        })?;

        let patch = ProfilePatch {
            onboarded: Some(true),
            selected_modules: Some(validated.selected_modules),
            age: Some(validated.age),
            country: Some(validated.country),
            onboarding_completed_at: Some(Utc::now()),
        };
        let profile = self.store.merge(&identity.subject, &patch).await?;

        info!(
            subject = %identity.subject,
            modules = profile.selected_modules.len(),
            "Onboarding recorded"
        );
        Ok(profile)
    }
}
