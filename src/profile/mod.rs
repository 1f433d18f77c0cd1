//! Profile documents and the profile store.
//!
//! One profile per identity holds its role, onboarding status, and module
//! selections. The store publishes every committed write so sessions can
//! reflect role and onboarding changes live.

pub mod libsql_store;
pub mod migrations;
pub mod model;
pub mod store;
pub mod subscription;

pub use libsql_store::LibSqlProfileStore;
pub use model::{Profile, ProfileChange, ProfilePatch, Role};
pub use store::ProfileStore;
pub use subscription::{Epoch, ProfileNotice, ProfileSubscription, watch_profile};
