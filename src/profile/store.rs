//! `ProfileStore` trait: the document store holding one profile per identity.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::model::{Profile, ProfileChange, ProfilePatch, Role};
use crate::error::StoreError;
use crate::identity::SubjectId;

/// Backend-agnostic profile store with change notification.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read a profile. `Ok(None)` when the identity has no record yet.
    async fn get(&self, subject: &SubjectId) -> Result<Option<Profile>, StoreError>;

    /// Create-or-merge a profile.
    ///
    /// Only fields named by the patch are written. The write is atomic: on
    /// error the stored record is unchanged.
    async fn merge(&self, subject: &SubjectId, patch: &ProfilePatch)
    -> Result<Profile, StoreError>;

    /// Assign (or clear) the role on a profile, creating it if needed.
    async fn set_role(&self, subject: &SubjectId, role: Option<Role>)
    -> Result<Profile, StoreError>;

    /// Subscribe to committed writes across all profiles.
    fn changes(&self) -> broadcast::Receiver<ProfileChange>;
}
