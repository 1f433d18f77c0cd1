//! Real-time subscription to a single profile document.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::model::Profile;
use super::store::ProfileStore;
use crate::error::StoreError;
use crate::identity::SubjectId;

/// Monotonic tag identifying the subscription a notification came from.
pub type Epoch = u64;

/// One delivery from a profile subscription.
///
/// `Ok(None)` means the document does not exist. An `Err` ends the
/// subscription.
#[derive(Debug, Clone)]
pub struct ProfileNotice {
    pub epoch: Epoch,
    pub subject: SubjectId,
    pub result: Result<Option<Profile>, StoreError>,
}

/// Handle to a live profile subscription. Dropping it cancels the listener.
#[derive(Debug)]
pub struct ProfileSubscription {
    epoch: Epoch,
    subject: SubjectId,
    handle: JoinHandle<()>,
}

impl Drop for ProfileSubscription {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(subject = %self.subject, epoch = self.epoch, "Profile subscription cancelled");
    }
}

/// Subscribe to one profile document.
///
/// Delivers the current snapshot (existing or not-found) first, then every
/// committed change to that subject. If the listener falls behind the
/// store's change feed it re-reads the snapshot instead of replaying.
pub fn watch_profile(
    store: Arc<dyn ProfileStore>,
    subject: SubjectId,
    epoch: Epoch,
    sink: mpsc::UnboundedSender<ProfileNotice>,
) -> ProfileSubscription {
    // Subscribe before the snapshot read so no write can slip between them.
    let mut changes = store.changes();
    let task_subject = subject.clone();

    let handle = tokio::spawn(async move {
        let subject = task_subject;
        let deliver = |result: Result<Option<Profile>, StoreError>| {
            let ended = result.is_err();
            let sent = sink
                .send(ProfileNotice {
                    epoch,
                    subject: subject.clone(),
                    result,
                })
                .is_ok();
            sent && !ended
        };

        if !deliver(store.get(&subject).await) {
            return;
        }

        loop {
            match changes.recv().await {
                Ok(change) if change.subject == subject => {
                    if !deliver(Ok(Some(change.profile))) {
                        return;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(subject = %subject, missed, "Profile listener lagged, re-reading");
                    if !deliver(store.get(&subject).await) {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(subject = %subject, "Profile change feed closed");
                    return;
                }
            }
        }
    });

    ProfileSubscription {
        epoch,
        subject,
        handle,
    }
}
