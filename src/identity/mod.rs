//! Identities issued by the credential provider.
//!
//! The provider itself is external. This module holds what the service
//! needs from it: the identity shape, server-side token verification, and
//! the per-session auth-state feed the session state machine listens to.

pub mod feed;
pub mod model;
pub mod token;

pub use feed::{AuthFeed, AuthState};
pub use model::{Identity, SubjectId};
pub use token::{Hs256Verifier, IdentityClaims, TokenVerifier, bearer_token};
