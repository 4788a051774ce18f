//! Client-side session controller.
//!
//! One [`SessionController`] owns the session state for the lifetime of the
//! application. It is hydrated once from storage and is the only thing that
//! writes or clears the persisted session. The latest state is available on a
//! `watch` channel; every transition, including the short-lived `Rejected`,
//! is also sent in order on a `broadcast` channel.
//!
//! ```text
//! Anonymous ──submit──▶ Authenticating ──ok──▶ Authenticated
//!     ▲                      │ error                │
//!     └──────────────────────┘                      │ logout
//!     ▲                                             │
//!     └──────────── Rejected ◀──── any 401 ─────────┘
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::authz::{self, Principal};
use crate::client::error::ClientError;
use crate::client::store::{ClientSession, SessionStore};

pub const LOGIN_PATH: &str = "/login";

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated(ClientSession),
    /// A request came back 401. Immediately followed by `Anonymous`, so it
    /// is only observable through [`SessionController::events`].
    Rejected,
}

impl SessionState {
    pub fn session(&self) -> Option<&ClientSession> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

/// Where the application currently is, and how to move it.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, path: &str);
}

/// Headless navigator: keeps the visited paths in memory.
///
/// Used by command-line front ends that have no router of their own, and
/// by tests that assert on redirects.
pub struct RecordingNavigator {
    history: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new(start: &str) -> Self {
        RecordingNavigator {
            history: Mutex::new(vec![start.to_string()]),
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.history.lock().last().cloned().unwrap_or_else(|| "/".to_string())
    }

    fn navigate(&self, path: &str) {
        self.history.lock().push(path.to_string());
    }
}

/// Ticket for one login or registration submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    seq: u64,
}

impl Attempt {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated {
        session: ClientSession,
        /// Page the user was bounced from, if any.
        return_to: Option<String>,
    },
    Failed(ClientError),
    /// A newer attempt exists; this result was dropped.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToLogin { from: String },
}

/// Mutable controller state. Every transition holds this lock from the
/// attempt check through the store write to the publish.
#[derive(Default)]
struct Pending {
    seq: u64,
    return_to: Option<String>,
    last_error: Option<String>,
}

pub struct SessionController {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionState>,
    pending: Mutex<Pending>,
}

fn path_only(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

impl SessionController {
    pub fn new(store: Arc<dyn SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        SessionController {
            store,
            navigator,
            state,
            events,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Restores the persisted session. Call once at startup.
    pub fn hydrate(&self) -> SessionState {
        let _pending = self.pending.lock();
        let next = match self.store.load() {
            Ok(Some(session)) => {
                tracing::debug!(account_id = %session.id, "session rehydrated");
                SessionState::Authenticated(session)
            }
            Ok(None) => SessionState::Anonymous,
            Err(e) => {
                tracing::warn!(error = %e, "could not read persisted session");
                let _ = self.store.clear();
                SessionState::Anonymous
            }
        };

        self.publish(next.clone());
        next
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<ClientSession> {
        self.state.borrow().session().cloned()
    }

    /// Bearer credential for outgoing requests. While a new attempt is in
    /// flight the previously persisted session still applies.
    pub fn token(&self) -> Option<String> {
        let state = self.state();
        match state {
            SessionState::Authenticated(session) => Some(session.token),
            SessionState::Authenticating => self.store.load().ok().flatten().map(|s| s.token),
            SessionState::Anonymous | SessionState::Rejected => None,
        }
    }

    /// Latest state only; intermediate states may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Every transition from now on, in order. A lagging receiver gets
    /// `RecvError::Lagged` and should resync from [`Self::state`].
    pub fn events(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }

    /// True while a login/registration is in flight; forms disable submit.
    pub fn is_busy(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Authenticating)
    }

    /// Message from the last failed attempt.
    pub fn last_error(&self) -> Option<String> {
        self.pending.lock().last_error.clone()
    }

    pub fn begin_attempt(&self) -> Attempt {
        let mut pending = self.pending.lock();
        pending.seq += 1;
        pending.last_error = None;
        self.publish(SessionState::Authenticating);
        Attempt { seq: pending.seq }
    }

    /// Applies the server's answer to `attempt`. Results of superseded
    /// attempts are ignored.
    pub fn complete(
        &self,
        attempt: Attempt,
        result: Result<ClientSession, ClientError>,
    ) -> AuthOutcome {
        let mut pending = self.pending.lock();
        if pending.seq != attempt.seq {
            tracing::debug!(seq = attempt.seq, "dropping stale authentication result");
            return AuthOutcome::Stale;
        }

        let result = result.and_then(|session| self.store.save(&session).map(|_| session));

        match result {
            Ok(session) => {
                let return_to = pending.return_to.take();
                tracing::info!(account_id = %session.id, "signed in");
                self.publish(SessionState::Authenticated(session.clone()));
                AuthOutcome::Authenticated { session, return_to }
            }
            Err(e) => {
                pending.last_error = Some(e.user_message());
                // Nothing was persisted, so fall back to whatever storage holds.
                let fallback = match self.store.load() {
                    Ok(Some(previous)) => SessionState::Authenticated(previous),
                    _ => SessionState::Anonymous,
                };
                self.publish(fallback);
                AuthOutcome::Failed(e)
            }
        }
    }

    /// Explicit sign-out. Also invalidates any attempt still in flight.
    pub fn logout(&self) {
        let mut pending = self.pending.lock();
        let seq = pending.seq + 1;
        *pending = Pending {
            seq,
            ..Pending::default()
        };
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "could not clear persisted session");
        }
        self.publish(SessionState::Anonymous);
        tracing::info!("signed out");
    }

    /// Reaction to a 401 from any request. Returns whether a redirect to
    /// the login surface happened.
    pub fn reject(&self) -> bool {
        let mut pending = self.pending.lock();
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "could not clear persisted session");
        }

        if self.session().is_some() {
            tracing::info!("session rejected by server");
            self.publish(SessionState::Rejected);
            self.publish(SessionState::Anonymous);
        }

        let current = self.navigator.current_path();
        if path_only(&current) == LOGIN_PATH {
            return false;
        }

        pending.return_to = Some(current);
        drop(pending);
        self.navigator.navigate(LOGIN_PATH);
        true
    }

    /// Gate for views that need a session.
    pub fn guard(&self, path: &str) -> RouteDecision {
        if self.session().is_some() {
            RouteDecision::Allow
        } else {
            self.pending.lock().return_to = Some(path.to_string());
            RouteDecision::RedirectToLogin {
                from: path.to_string(),
            }
        }
    }

    /// Whether the current user may edit or delete something owned by `owner`.
    pub fn can_mutate<O: Principal + ?Sized>(&self, owner: &O) -> bool {
        let session = self.session();
        authz::can_mutate(owner, session.as_ref())
    }

    fn publish(&self, next: SessionState) {
        // No receivers is fine.
        let _ = self.events.send(next.clone());
        self.state.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::MemoryStore;
    use crate::db::PostOwner;

    fn ada() -> ClientSession {
        ClientSession {
            id: "a1".into(),
            name: "Ada".into(),
            email: "ada@x.com".into(),
            token: "tok-a".into(),
        }
    }

    fn controller(start: &str) -> (SessionController, Arc<MemoryStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(MemoryStore::new());
        let nav = Arc::new(RecordingNavigator::new(start));
        let controller = SessionController::new(store.clone(), nav.clone());
        (controller, store, nav)
    }

    #[test]
    fn hydrate_restores_persisted_session() {
        let (controller, store, _) = controller("/");
        store.save(&ada()).unwrap();
        assert_eq!(controller.hydrate(), SessionState::Authenticated(ada()));
        assert_eq!(controller.token().as_deref(), Some("tok-a"));
    }

    #[test]
    fn successful_attempt_persists_and_notifies() {
        let (controller, store, _) = controller("/");
        controller.hydrate();
        let mut rx = controller.subscribe();

        let attempt = controller.begin_attempt();
        assert!(controller.is_busy());

        let outcome = controller.complete(attempt, Ok(ada()));
        assert!(matches!(outcome, AuthOutcome::Authenticated { .. }));
        assert_eq!(store.load().unwrap(), Some(ada()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Authenticated(ada()));
        assert!(!controller.is_busy());
    }

    #[test]
    fn failed_attempt_persists_nothing() {
        let (controller, store, _) = controller("/login");
        controller.hydrate();

        let attempt = controller.begin_attempt();
        let err = ClientError::Api {
            status: 400,
            message: "Invalid credentials".into(),
        };
        let outcome = controller.complete(attempt, Err(err.clone()));

        assert_eq!(outcome, AuthOutcome::Failed(err));
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(controller.last_error().as_deref(), Some("Invalid credentials"));
    }

    #[test]
    fn stale_result_is_ignored() {
        let (controller, store, _) = controller("/login");
        let first = controller.begin_attempt();
        let second = controller.begin_attempt();
        assert!(second.seq() > first.seq());

        let bob = ClientSession {
            id: "b2".into(),
            email: "bob@x.com".into(),
            ..ada()
        };
        assert!(matches!(
            controller.complete(second, Ok(bob.clone())),
            AuthOutcome::Authenticated { .. }
        ));
        assert_eq!(controller.complete(first, Ok(ada())), AuthOutcome::Stale);

        assert_eq!(controller.session(), Some(bob.clone()));
        assert_eq!(store.load().unwrap(), Some(bob));
    }

    #[test]
    fn token_survives_a_pending_relogin() {
        let (controller, store, _) = controller("/");
        store.save(&ada()).unwrap();
        controller.hydrate();

        let _attempt = controller.begin_attempt();
        assert_eq!(controller.token().as_deref(), Some("tok-a"));
    }

    #[test]
    fn logout_clears_everything() {
        let (controller, store, _) = controller("/");
        store.save(&ada()).unwrap();
        controller.hydrate();

        controller.logout();
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(controller.token(), None);
    }

    #[test]
    fn logout_supersedes_in_flight_attempt() {
        let (controller, store, _) = controller("/login");
        let attempt = controller.begin_attempt();
        controller.logout();
        assert_eq!(controller.complete(attempt, Ok(ada())), AuthOutcome::Stale);
        assert_eq!(store.load().unwrap(), None);
    }

    /// Store whose first `save` lets another thread start a logout and
    /// gives it time to run before the write lands.
    struct RacingStore {
        inner: MemoryStore,
        racer: Mutex<Option<Arc<SessionController>>>,
        logout_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    }

    impl SessionStore for RacingStore {
        fn load(&self) -> Result<Option<ClientSession>, ClientError> {
            self.inner.load()
        }

        fn save(&self, session: &ClientSession) -> Result<(), ClientError> {
            if let Some(controller) = self.racer.lock().take() {
                let (started_tx, started_rx) = std::sync::mpsc::channel();
                let handle = std::thread::spawn(move || {
                    started_tx.send(()).unwrap();
                    controller.logout();
                });
                started_rx.recv().unwrap();
                std::thread::sleep(std::time::Duration::from_millis(50));
                *self.logout_thread.lock() = Some(handle);
            }
            self.inner.save(session)
        }

        fn clear(&self) -> Result<(), ClientError> {
            self.inner.clear()
        }
    }

    #[test]
    fn logout_during_persist_is_not_overridden() {
        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(),
            racer: Mutex::new(None),
            logout_thread: Mutex::new(None),
        });
        let nav = Arc::new(RecordingNavigator::new("/login"));
        let controller = Arc::new(SessionController::new(store.clone(), nav));
        *store.racer.lock() = Some(controller.clone());

        let attempt = controller.begin_attempt();
        let outcome = controller.complete(attempt, Ok(ada()));
        assert!(matches!(outcome, AuthOutcome::Authenticated { .. }));

        store.logout_thread.lock().take().unwrap().join().unwrap();
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(controller.token(), None);
    }

    #[test]
    fn logout_notifies_subscribers() {
        let (controller, store, _) = controller("/");
        store.save(&ada()).unwrap();
        controller.hydrate();
        let mut rx = controller.subscribe();
        let mut events = controller.events();

        controller.logout();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
        assert_eq!(events.try_recv().unwrap(), SessionState::Anonymous);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn reject_announces_rejected_before_anonymous() {
        let (controller, store, _) = controller("/posts/7");
        store.save(&ada()).unwrap();
        controller.hydrate();
        let mut rx = controller.subscribe();
        let mut events = controller.events();

        controller.reject();
        assert_eq!(events.try_recv().unwrap(), SessionState::Rejected);
        assert_eq!(events.try_recv().unwrap(), SessionState::Anonymous);
        assert!(events.try_recv().is_err());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
    }

    #[test]
    fn reject_redirects_and_remembers_target() {
        let (controller, store, nav) = controller("/edit-post/42");
        store.save(&ada()).unwrap();
        controller.hydrate();

        assert!(controller.reject());
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(nav.current_path(), LOGIN_PATH);

        let attempt = controller.begin_attempt();
        match controller.complete(attempt, Ok(ada())) {
            AuthOutcome::Authenticated { return_to, .. } => {
                assert_eq!(return_to.as_deref(), Some("/edit-post/42"))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn reject_on_login_page_does_not_navigate() {
        let (controller, _, nav) = controller("/login?next=1");
        assert!(!controller.reject());
        assert_eq!(nav.history(), vec!["/login?next=1".to_string()]);
    }

    #[test]
    fn guard_requires_session() {
        let (controller, store, _) = controller("/");
        controller.hydrate();
        assert_eq!(
            controller.guard("/create-post"),
            RouteDecision::RedirectToLogin {
                from: "/create-post".into()
            }
        );

        store.save(&ada()).unwrap();
        controller.hydrate();
        assert_eq!(controller.guard("/create-post"), RouteDecision::Allow);
    }

    #[test]
    fn affordances_follow_ownership() {
        let (controller, store, _) = controller("/");
        let owner = PostOwner {
            id: "a1".into(),
            name: "Ada".into(),
            email: "ada@x.com".into(),
        };
        assert!(!controller.can_mutate(&owner));

        store.save(&ada()).unwrap();
        controller.hydrate();
        assert!(controller.can_mutate(&owner));
    }
}
