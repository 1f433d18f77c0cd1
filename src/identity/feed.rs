//! Auth-state feed: the identity-change source a session subscribes to.

use tokio::sync::watch;
use tracing::debug;

use super::model::Identity;

/// Sign-in state as reported by the credential provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The provider has not reported anything yet.
    Unknown,
    SignedOut,
    SignedIn(Identity),
}

/// Publishes sign-in/sign-out transitions for one client.
///
/// Subscribers observe the current state first and then every change.
/// Rapid successive changes may be coalesced; a subscriber always ends up
/// seeing the latest state.
pub struct AuthFeed {
    tx: watch::Sender<AuthState>,
}

impl AuthFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Unknown);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn sign_in(&self, identity: Identity) {
        debug!(subject = %identity.subject, "Auth feed: signed in");
        self.tx.send_replace(AuthState::SignedIn(identity));
    }

    pub fn sign_out(&self) {
        debug!("Auth feed: signed out");
        self.tx.send_replace(AuthState::SignedOut);
    }
}

impl Default for AuthFeed {
    fn default() -> Self {
        Self::new()
    }
}
