//! Session state machine.
//!
//! Derives one consistent view from two independently updating sources: the
//! identity feed and the signed-in identity's profile document. Each profile
//! subscription is tagged with an epoch; notifications carrying anything
//! but the current epoch are dropped, so a slow snapshot for a previous
//! identity can never land in the current one's view.
//!
//! ```text
//! AwaitingIdentity ──signed out──▶ Unauthenticated
//!        │                              ▲   │
//!    signed in                 signed out   signed in
//!        ▼                              │   ▼
//!  AuthenticatingProfile ──first profile notice──▶ Ready ◀─┐
//!                                                    └─────┘ later notices
//! ```

use std::collections::BTreeSet;

use super::view::SessionView;
use crate::error::StoreError;
use crate::identity::{AuthState, Identity, SubjectId};
use crate::profile::{Epoch, Profile, Role};

/// Coarse phase of a session, for logging and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingIdentity,
    Unauthenticated,
    AuthenticatingProfile,
    Ready,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingIdentity => "awaiting_identity",
            Self::Unauthenticated => "unauthenticated",
            Self::AuthenticatingProfile => "authenticating_profile",
            Self::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

/// Full session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingIdentity,
    Unauthenticated,
    AuthenticatingProfile {
        identity: Identity,
        epoch: Epoch,
    },
    Ready {
        identity: Identity,
        epoch: Epoch,
        role: Option<Role>,
        onboarded: bool,
        selected_modules: BTreeSet<String>,
    },
}

/// What the caller must do with the profile subscription after an identity event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    None,
    /// Cancel any current subscription, then subscribe to `subject` tagged `epoch`.
    Subscribe { subject: SubjectId, epoch: Epoch },
    /// Cancel the current subscription.
    Unsubscribe,
}

/// The reducer. Holds no I/O; the session driver feeds it events.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    last_epoch: Epoch,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingIdentity,
            last_epoch: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::AwaitingIdentity => SessionPhase::AwaitingIdentity,
            SessionState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionState::AuthenticatingProfile { .. } => SessionPhase::AuthenticatingProfile,
            SessionState::Ready { .. } => SessionPhase::Ready,
        }
    }

    /// Epoch of the subscription the current state is waiting on or fed by.
    pub fn current_epoch(&self) -> Option<Epoch> {
        match self.state {
            SessionState::AuthenticatingProfile { epoch, .. } | SessionState::Ready { epoch, .. } => {
                Some(epoch)
            }
            _ => None,
        }
    }

    fn current_identity_mut(&mut self) -> Option<&mut Identity> {
        match &mut self.state {
            SessionState::AuthenticatingProfile { identity, .. }
            | SessionState::Ready { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Apply an identity-feed report.
    pub fn on_auth(&mut self, auth: &AuthState) -> Directive {
        match auth {
            // Nothing reported yet; a feed never goes back to Unknown once it has spoken.
            AuthState::Unknown => Directive::None,
            AuthState::SignedOut => {
                let had_subscription = self.current_epoch().is_some();
                self.state = SessionState::Unauthenticated;
                if had_subscription {
                    Directive::Unsubscribe
                } else {
                    Directive::None
                }
            }
            AuthState::SignedIn(identity) => {
                if let Some(current) = self.current_identity_mut() {
                    if current.subject == identity.subject {
                        // Same identity re-reported (e.g. token refresh): keep the subscription.
                        *current = identity.clone();
                        return Directive::None;
                    }
                }
                self.last_epoch += 1;
                let epoch = self.last_epoch;
                self.state = SessionState::AuthenticatingProfile {
                    identity: identity.clone(),
                    epoch,
                };
                Directive::Subscribe {
                    subject: identity.subject.clone(),
                    epoch,
                }
            }
        }
    }

    /// Apply a profile-subscription delivery.
    ///
    /// Returns `false` when the notice belongs to a superseded subscription
    /// and was dropped.
    pub fn on_profile(
        &mut self,
        epoch: Epoch,
        subject: &SubjectId,
        result: Result<Option<Profile>, StoreError>,
    ) -> bool {
        let (identity, was_ready) = match &self.state {
            SessionState::AuthenticatingProfile {
                identity,
                epoch: current,
            } if *current == epoch && identity.subject == *subject => (identity.clone(), false),
            SessionState::Ready {
                identity,
                epoch: current,
                ..
            } if *current == epoch && identity.subject == *subject => (identity.clone(), true),
            _ => return false,
        };

        match result {
            Ok(Some(profile)) => {
                self.state = SessionState::Ready {
                    identity,
                    epoch,
                    role: profile.role,
                    onboarded: profile.onboarded,
                    selected_modules: profile.selected_modules,
                };
            }
            Ok(None) => {
                self.state = SessionState::Ready {
                    identity,
                    epoch,
                    role: None,
                    onboarded: false,
                    selected_modules: BTreeSet::new(),
                };
            }
            // A failure after the first value keeps the last good fields.
            Err(_) if was_ready => {}
            Err(_) => {
                self.state = SessionState::Ready {
                    identity,
                    epoch,
                    role: None,
                    onboarded: false,
                    selected_modules: BTreeSet::new(),
                };
            }
        }
        true
    }

    /// Current derived view.
    pub fn view(&self) -> SessionView {
        match &self.state {
            SessionState::AwaitingIdentity => SessionView::loading(),
            SessionState::Unauthenticated => SessionView::signed_out(),
            SessionState::AuthenticatingProfile { identity, .. } => SessionView {
                identity: Some(identity.clone()),
                ..SessionView::loading()
            },
            SessionState::Ready {
                identity,
                role,
                onboarded,
                selected_modules,
                ..
            } => SessionView {
                identity: Some(identity.clone()),
                role: *role,
                onboarding_complete: Some(*onboarded),
                selected_modules: selected_modules.clone(),
                loading: false,
            },
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn identity(subject: &str) -> Identity {
        Identity::new(SubjectId::new(subject).unwrap())
    }

    fn profile(subject: &str, role: Option<Role>, onboarded: bool) -> Profile {
        Profile {
            subject: SubjectId::new(subject).unwrap(),
            role,
            onboarded,
            selected_modules: ["devotions".to_string()].into(),
            age: Some(40),
            country: Some("Unknown".to_string()),
            onboarding_completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn subscribe_epoch(directive: Directive) -> (SubjectId, Epoch) {
        match directive {
            Directive::Subscribe { subject, epoch } => (subject, epoch),
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn starts_loading_before_identity_reports() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.phase(), SessionPhase::AwaitingIdentity);
        assert!(machine.view().loading);

        assert_eq!(machine.on_auth(&AuthState::Unknown), Directive::None);
        assert!(machine.view().loading);
    }

    #[test]
    fn signed_out_report_settles_without_subscription() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.on_auth(&AuthState::SignedOut), Directive::None);
        assert_eq!(machine.phase(), SessionPhase::Unauthenticated);
        assert_eq!(machine.view(), SessionView::signed_out());
    }

    #[test]
    fn sign_in_stays_loading_until_profile_delivers() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        assert_eq!(subject.as_str(), "a");
        assert_eq!(machine.phase(), SessionPhase::AuthenticatingProfile);

        let view = machine.view();
        assert!(view.loading);
        assert!(view.is_signed_in());
        assert_eq!(view.onboarding_complete, None);

        assert!(machine.on_profile(epoch, &subject, Ok(Some(profile("a", Some(Role::Admin), true)))));
        let view = machine.view();
        assert!(!view.loading);
        assert_eq!(view.role, Some(Role::Admin));
        assert_eq!(view.onboarding_complete, Some(true));
        assert!(view.selected_modules.contains("devotions"));
    }

    #[test]
    fn not_found_counts_as_delivery() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        assert!(machine.on_profile(epoch, &subject, Ok(None)));

        let view = machine.view();
        assert!(!view.loading);
        assert_eq!(view.role, None);
        assert_eq!(view.onboarding_complete, Some(false));
        assert!(view.selected_modules.is_empty());
    }

    #[test]
    fn store_error_exits_loading_with_defaults() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        let err = StoreError::PermissionDenied("rules".to_string());
        assert!(machine.on_profile(epoch, &subject, Err(err)));

        let view = machine.view();
        assert!(!view.loading);
        assert_eq!(view.onboarding_complete, Some(false));
        assert_eq!(machine.phase(), SessionPhase::Ready);
    }

    #[test]
    fn store_error_after_ready_keeps_last_good_fields() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        machine.on_profile(epoch, &subject, Ok(Some(profile("a", Some(Role::User), true))));

        let err = StoreError::Unavailable("network".to_string());
        assert!(machine.on_profile(epoch, &subject, Err(err)));
        assert_eq!(machine.view().onboarding_complete, Some(true));
        assert_eq!(machine.view().role, Some(Role::User));
    }

    #[test]
    fn later_notices_update_ready_live() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        machine.on_profile(epoch, &subject, Ok(Some(profile("a", None, false))));
        assert_eq!(machine.view().role, None);

        machine.on_profile(epoch, &subject, Ok(Some(profile("a", Some(Role::Admin), true))));
        let view = machine.view();
        assert_eq!(view.role, Some(Role::Admin));
        assert_eq!(view.onboarding_complete, Some(true));
    }

    #[test]
    fn sign_out_resets_fields_and_unsubscribes() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        machine.on_profile(epoch, &subject, Ok(Some(profile("a", Some(Role::Admin), true))));

        assert_eq!(machine.on_auth(&AuthState::SignedOut), Directive::Unsubscribe);
        assert_eq!(machine.view(), SessionView::signed_out());
        assert_eq!(machine.current_epoch(), None);
    }

    #[test]
    fn stale_notice_from_previous_identity_is_dropped() {
        let mut machine = SessionMachine::new();
        let (subject_a, epoch_a) =
            subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        machine.on_auth(&AuthState::SignedOut);
        let (subject_b, epoch_b) =
            subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("b"))));
        assert_ne!(epoch_a, epoch_b);

        // A's slow first snapshot arrives after B signed in.
        let late = Ok(Some(profile("a", Some(Role::Admin), true)));
        assert!(!machine.on_profile(epoch_a, &subject_a, late));

        let view = machine.view();
        assert!(view.loading);
        assert_eq!(view.identity.unwrap().subject, subject_b);
        assert_eq!(view.role, None);

        assert!(machine.on_profile(epoch_b, &subject_b, Ok(None)));
        assert_eq!(machine.view().role, None);
        assert_eq!(machine.view().onboarding_complete, Some(false));
    }

    #[test]
    fn direct_identity_switch_resubscribes() {
        let mut machine = SessionMachine::new();
        let (_, epoch_a) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        let (subject_b, epoch_b) =
            subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("b"))));
        assert!(epoch_b > epoch_a);
        assert_eq!(subject_b.as_str(), "b");
        assert_eq!(machine.current_epoch(), Some(epoch_b));
    }

    #[test]
    fn same_identity_rereported_keeps_subscription() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        machine.on_profile(epoch, &subject, Ok(Some(profile("a", Some(Role::User), true))));

        let refreshed = identity("a").with_display_name("Anna");
        assert_eq!(machine.on_auth(&AuthState::SignedIn(refreshed)), Directive::None);
        let view = machine.view();
        assert_eq!(view.identity.unwrap().display_name.as_deref(), Some("Anna"));
        assert_eq!(view.role, Some(Role::User));
        assert_eq!(machine.current_epoch(), Some(epoch));
    }

    #[test]
    fn notice_after_sign_out_is_dropped() {
        let mut machine = SessionMachine::new();
        let (subject, epoch) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        machine.on_auth(&AuthState::SignedOut);

        assert!(!machine.on_profile(epoch, &subject, Ok(Some(profile("a", Some(Role::Admin), true)))));
        assert_eq!(machine.view(), SessionView::signed_out());
    }

    #[test]
    fn loading_is_false_iff_required_sources_delivered() {
        // Walk a mixed sequence and check the loading invariant at each step.
        let mut machine = SessionMachine::new();
        assert!(machine.view().loading);

        machine.on_auth(&AuthState::SignedOut);
        assert!(!machine.view().loading);

        let (s1, e1) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("a"))));
        assert!(machine.view().loading);
        machine.on_profile(e1, &s1, Ok(None));
        assert!(!machine.view().loading);

        let (s2, e2) = subscribe_epoch(machine.on_auth(&AuthState::SignedIn(identity("b"))));
        assert!(machine.view().loading);
        machine.on_profile(e1, &s1, Ok(None));
        assert!(machine.view().loading, "stale delivery must not settle the new identity");
        machine.on_profile(e2, &s2, Err(StoreError::Query("boom".to_string())));
        assert!(!machine.view().loading);

        machine.on_auth(&AuthState::SignedOut);
        assert!(!machine.view().loading);
    }
}
