//! Session view: the derived, read-only answer to "who is signed in and
//! what may they see".

use std::collections::BTreeSet;

use serde::Serialize;

use crate::identity::Identity;
use crate::profile::Role;

/// Snapshot of a session.
///
/// Invariants:
/// - `loading` stays true until the identity feed has reported and, for a
///   signed-in identity, the profile subscription has delivered once (a
///   value, a not-found, or an error).
/// - `onboarding_complete` is `None` exactly while `loading` is true.
/// - With no identity, `role`, `onboarding_complete` and `selected_modules`
///   hold their empty defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub identity: Option<Identity>,
    pub role: Option<Role>,
    pub onboarding_complete: Option<bool>,
    pub selected_modules: BTreeSet<String>,
    pub loading: bool,
}

impl SessionView {
    /// View before the identity feed has reported.
    pub fn loading() -> Self {
        Self {
            identity: None,
            role: None,
            onboarding_complete: None,
            selected_modules: BTreeSet::new(),
            loading: true,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            onboarding_complete: Some(false),
            loading: false,
            ..Self::loading()
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}
