//! Async session driver: owns a [`SessionMachine`], the identity-feed
//! receiver and at most one live profile subscription.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::machine::{Directive, SessionMachine};
use super::view::SessionView;
use crate::identity::{AuthState, Identity};
use crate::profile::{ProfileNotice, ProfileStore, ProfileSubscription, watch_profile};

/// A running session. Readers observe it through a watch channel.
///
/// Dropping the handle stops the driver and cancels any live profile
/// subscription; [`Session::shutdown`] does the same but waits for it.
pub struct Session {
    id: Uuid,
    view_rx: watch::Receiver<SessionView>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Session {
    /// Start a session fed by `auth`, reading profiles from `store`.
    pub fn start(store: Arc<dyn ProfileStore>, auth: watch::Receiver<AuthState>) -> Self {
        let id = Uuid::new_v4();
        let (view_tx, view_rx) = watch::channel(SessionView::loading());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(id, store, auth, view_tx, shutdown_rx));
        info!(session_id = %id, "Session started");

        Self {
            id,
            view_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current view.
    pub fn snapshot(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    /// Receiver that is notified whenever the view changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    /// Stop the driver and wait until the profile subscription is released.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    id: Uuid,
    store: Arc<dyn ProfileStore>,
    mut auth: watch::Receiver<AuthState>,
    view_tx: watch::Sender<SessionView>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut machine = SessionMachine::new();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<ProfileNotice>();
    let mut subscription: Option<ProfileSubscription> = None;

    // The feed may already hold a report; apply it before waiting for changes.
    let initial = auth.borrow_and_update().clone();
    apply_directive(
        machine.on_auth(&initial),
        &store,
        &notice_tx,
        &mut subscription,
    );
    publish(&view_tx, &machine);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!(session_id = %id, "Session shutdown requested");
                break;
            }

            changed = auth.changed() => {
                if changed.is_err() {
                    debug!(session_id = %id, "Identity feed closed");
                    break;
                }
                let state = auth.borrow_and_update().clone();
                let directive = machine.on_auth(&state);
                apply_directive(directive, &store, &notice_tx, &mut subscription);
                publish(&view_tx, &machine);
                debug!(session_id = %id, phase = %machine.phase(), "Identity changed");
            }

            Some(notice) = notice_rx.recv() => {
                if let Err(e) = &notice.result {
                    warn!(session_id = %id, subject = %notice.subject, error = %e, "Profile subscription failed");
                }
                if machine.on_profile(notice.epoch, &notice.subject, notice.result) {
                    publish(&view_tx, &machine);
                } else {
                    debug!(session_id = %id, epoch = notice.epoch, "Dropped stale profile notice");
                }
            }
        }
    }

    drop(subscription);
    info!(session_id = %id, "Session stopped");
}

fn apply_directive(
    directive: Directive,
    store: &Arc<dyn ProfileStore>,
    notice_tx: &mpsc::UnboundedSender<ProfileNotice>,
    subscription: &mut Option<ProfileSubscription>,
) {
    match directive {
        Directive::None => {}
        Directive::Unsubscribe => {
            subscription.take();
        }
        Directive::Subscribe { subject, epoch } => {
            // Release the superseded listener before the new one starts.
            subscription.take();
            *subscription = Some(watch_profile(
                Arc::clone(store),
                subject,
                epoch,
                notice_tx.clone(),
            ));
        }
    }
}

fn publish(view_tx: &watch::Sender<SessionView>, machine: &SessionMachine) {
    let next = machine.view();
    view_tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// One-shot view for a request-scoped caller: a single profile read, no
/// subscription.
pub async fn resolve_once(store: &dyn ProfileStore, identity: Option<Identity>) -> SessionView {
    let Some(identity) = identity else {
        return SessionView::signed_out();
    };

    let mut machine = SessionMachine::new();
    let subject = identity.subject.clone();
    let epoch = match machine.on_auth(&AuthState::SignedIn(identity)) {
        Directive::Subscribe { epoch, .. } => epoch,
        _ => return machine.view(),
    };
    let result = store.get(&subject).await;
    if let Err(e) = &result {
        warn!(subject = %subject, error = %e, "Profile read failed");
    }
    machine.on_profile(epoch, &subject, result);
    machine.view()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::broadcast;

    use super::*;
    use crate::error::StoreError;
    use crate::identity::{AuthFeed, SubjectId};
    use crate::profile::{Profile, ProfileChange, ProfilePatch, Role};

    /// In-memory store with per-subject read delays and a failure switch.
    struct StubStore {
        profiles: Mutex<HashMap<SubjectId, Profile>>,
        delays: Mutex<HashMap<SubjectId, Duration>>,
        fail: AtomicBool,
        changes: broadcast::Sender<ProfileChange>,
    }

    impl StubStore {
        fn new() -> Self {
            let (changes, _) = broadcast::channel(16);
            Self {
                profiles: Mutex::new(HashMap::new()),
                delays: Mutex::new(HashMap::new()),
                fail: AtomicBool::new(false),
                changes,
            }
        }

        fn delay(&self, subject: &SubjectId, delay: Duration) {
            self.delays.lock().unwrap().insert(subject.clone(), delay);
        }

        fn put(&self, profile: Profile) {
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.subject.clone(), profile.clone());
            let _ = self.changes.send(ProfileChange {
                subject: profile.subject.clone(),
                profile,
            });
        }

        fn listeners(&self) -> usize {
            self.changes.receiver_count()
        }
    }

    #[async_trait]
    impl ProfileStore for StubStore {
        async fn get(&self, subject: &SubjectId) -> Result<Option<Profile>, StoreError> {
            let delay = self.delays.lock().unwrap().get(subject).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::PermissionDenied("denied".to_string()));
            }
            Ok(self.profiles.lock().unwrap().get(subject).cloned())
        }

        async fn merge(
            &self,
            _subject: &SubjectId,
            _patch: &ProfilePatch,
        ) -> Result<Profile, StoreError> {
            Err(StoreError::Unavailable("read-only stub".to_string()))
        }

        async fn set_role(
            &self,
            _subject: &SubjectId,
            _role: Option<Role>,
        ) -> Result<Profile, StoreError> {
            Err(StoreError::Unavailable("read-only stub".to_string()))
        }

        fn changes(&self) -> broadcast::Receiver<ProfileChange> {
            self.changes.subscribe()
        }
    }

    fn subject(s: &str) -> SubjectId {
        SubjectId::new(s).unwrap()
    }

    fn identity(s: &str) -> Identity {
        Identity::new(subject(s))
    }

    fn profile(s: &str, role: Option<Role>, onboarded: bool) -> Profile {
        Profile {
            subject: subject(s),
            role,
            onboarded,
            selected_modules: Default::default(),
            age: None,
            country: None,
            onboarding_completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<SessionView>, pred: F) -> SessionView
    where
        F: Fn(&SessionView) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|v| pred(v)))
            .await
            .expect("timed out waiting for view")
            .expect("session dropped")
            .clone()
    }

    #[tokio::test]
    async fn view_stays_loading_until_profile_delivers() {
        let store = Arc::new(StubStore::new());
        store.put(profile("a", Some(Role::User), true));
        store.delay(&subject("a"), Duration::from_millis(150));

        let feed = AuthFeed::new();
        let session = Session::start(store.clone(), feed.subscribe());
        assert!(session.snapshot().loading);

        feed.sign_in(identity("a"));
        let mut rx = session.subscribe();
        let view = wait_for(&mut rx, |v| v.is_signed_in()).await;
        assert!(view.loading);
        assert_eq!(view.onboarding_complete, None);

        let view = wait_for(&mut rx, |v| !v.loading).await;
        assert_eq!(view.onboarding_complete, Some(true));
        assert_eq!(view.role, Some(Role::User));
    }

    #[tokio::test]
    async fn slow_snapshot_of_previous_identity_never_leaks() {
        let store = Arc::new(StubStore::new());
        store.put(profile("a", Some(Role::Admin), true));
        store.delay(&subject("a"), Duration::from_millis(200));

        let feed = AuthFeed::new();
        let session = Session::start(store.clone(), feed.subscribe());
        let mut rx = session.subscribe();

        feed.sign_in(identity("a"));
        wait_for(&mut rx, |v| v.is_signed_in()).await;
        feed.sign_out();
        feed.sign_in(identity("b"));

        let view = wait_for(&mut rx, |v| {
            !v.loading && v.identity.as_ref().map(|i| i.subject.as_str()) == Some("b")
        })
        .await;
        assert_eq!(view.role, None);
        assert_eq!(view.onboarding_complete, Some(false));

        // Give A's aborted read time to have completed if it were still alive.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let view = session.snapshot();
        assert_eq!(view.identity.unwrap().subject, subject("b"));
        assert_eq!(view.role, None);
        assert_eq!(store.listeners(), 1);
    }

    #[tokio::test]
    async fn role_change_is_reflected_live() {
        let store = Arc::new(StubStore::new());
        store.put(profile("a", None, true));

        let feed = AuthFeed::new();
        feed.sign_in(identity("a"));
        let session = Session::start(store.clone(), feed.subscribe());
        let mut rx = session.subscribe();
        wait_for(&mut rx, |v| !v.loading).await;

        store.put(profile("a", Some(Role::Admin), true));
        let view = wait_for(&mut rx, |v| v.role == Some(Role::Admin)).await;
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn store_failure_still_exits_loading() {
        let store = Arc::new(StubStore::new());
        store.fail.store(true, Ordering::SeqCst);

        let feed = AuthFeed::new();
        feed.sign_in(identity("a"));
        let session = Session::start(store.clone(), feed.subscribe());
        let mut rx = session.subscribe();

        let view = wait_for(&mut rx, |v| !v.loading).await;
        assert_eq!(view.onboarding_complete, Some(false));
        assert_eq!(view.role, None);
    }

    #[tokio::test]
    async fn signed_out_feed_settles_immediately() {
        let store = Arc::new(StubStore::new());
        let feed = AuthFeed::new();
        feed.sign_out();

        let session = Session::start(store.clone(), feed.subscribe());
        let mut rx = session.subscribe();
        let view = wait_for(&mut rx, |v| !v.loading).await;
        assert_eq!(view, SessionView::signed_out());
        assert_eq!(store.listeners(), 0);
    }

    #[tokio::test]
    async fn shutdown_releases_the_subscription() {
        let store = Arc::new(StubStore::new());
        let feed = AuthFeed::new();
        feed.sign_in(identity("a"));

        let session = Session::start(store.clone(), feed.subscribe());
        let mut rx = session.subscribe();
        wait_for(&mut rx, |v| !v.loading).await;
        assert_eq!(store.listeners(), 1);

        session.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.listeners() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription still alive after shutdown");
    }

    #[tokio::test]
    async fn resolve_once_reads_a_single_snapshot() {
        let store = StubStore::new();
        store.put(profile("a", Some(Role::Admin), false));

        let view = resolve_once(&store, Some(identity("a"))).await;
        assert!(!view.loading);
        assert_eq!(view.role, Some(Role::Admin));
        assert_eq!(view.onboarding_complete, Some(false));

        let view = resolve_once(&store, None).await;
        assert_eq!(view, SessionView::signed_out());
        assert_eq!(store.listeners(), 0);
    }
}
