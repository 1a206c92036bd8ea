//! Session manager: the single owner of "who is logged in".
//!
//! The FSM tracks transient states (authenticating, refreshing) that are never
//! persisted, while the session itself lives in memory and is mirrored to the
//! `CredentialStore`. Every change that ends in a stable state is persisted
//! (or cleared) first and published to observers second.
//!
//! A generation counter is bumped by login, logout and forced expiry. Network
//! results remember the generation they started under and are dropped if it
//! moved, so a late refresh can never resurrect a logged-out session.
//!
//! ## Lifecycle
//!
//! - `start()` seeds state from storage and validates it with the authority.
//! - While authenticated, a background task refreshes the access token every
//!   refresh interval (15 minutes by default).
//! - `shutdown()` cancels that task; dropping the last handle does the same.

use crate::auth_fsm::{
    SessionMachine, SessionMachineInput, SessionSnapshot, SessionState,
};
use crate::authority::AuthAuthority;
use crate::refresh::{exchange_refresh_token, RefreshOutcome, SingleFlight};
use crate::{AuthError, AuthResult};
use parking_lot::Mutex;
use portal_storage::{CredentialStore, Session, StorageError, User};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default periodic refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

struct Inner {
    store: CredentialStore,
    authority: Arc<dyn AuthAuthority>,
    /// Internal FSM for tracking state transitions.
    fsm: Mutex<SessionMachine>,
    /// In-memory session; authoritative over the store.
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    /// Set once the startup check (or any login/logout) has settled.
    resolved: AtomicBool,
    /// Serializes generation check + persist + transition.
    commit_lock: Mutex<()>,
    state_tx: watch::Sender<SessionSnapshot>,
    refresh_flight: SingleFlight,
    timer: Mutex<Option<JoinHandle<()>>>,
    refresh_interval: Duration,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Handle to the session state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a session manager with the default refresh interval.
    pub fn new(store: CredentialStore, authority: Arc<dyn AuthAuthority>) -> Self {
        Self::with_refresh_interval(store, authority, DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a session manager with a custom periodic refresh interval.
    pub fn with_refresh_interval(
        store: CredentialStore,
        authority: Arc<dyn AuthAuthority>,
        refresh_interval: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionSnapshot::initial());
        Self {
            inner: Arc::new(Inner {
                store,
                authority,
                fsm: Mutex::new(SessionMachine::new()),
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                resolved: AtomicBool::new(false),
                commit_lock: Mutex::new(()),
                state_tx,
                refresh_flight: SingleFlight::new(),
                timer: Mutex::new(None),
                refresh_interval,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        SessionState::from(self.inner.fsm.lock().state())
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to published snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state_tx.subscribe()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// The logged-in user, if a session is held.
    pub fn current_user(&self) -> Option<User> {
        self.snapshot().user
    }

    /// The access token to attach to outbound requests, if any.
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Read access to the credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Whether the periodic refresh task is running.
    pub fn is_refresh_timer_armed(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn bump_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Transition the FSM and publish the resulting snapshot.
    fn transition(&self, input: &SessionMachineInput) -> AuthResult<SessionState> {
        let mut fsm = self.inner.fsm.lock();
        let old_state = SessionState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = SessionState::from(fsm.state());
        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Session state transition"
            );
        }
        self.publish_locked(new_state);

        Ok(new_state)
    }

    fn publish(&self) {
        let fsm = self.inner.fsm.lock();
        self.publish_locked(SessionState::from(fsm.state()));
    }

    // Caller holds the FSM lock, which orders publishes.
    fn publish_locked(&self, state: SessionState) {
        let user = match state {
            SessionState::Authenticated | SessionState::Refreshing => {
                self.inner.session.lock().as_ref().map(|s| s.user.clone())
            }
            SessionState::Unauthenticated | SessionState::Authenticating => None,
        };

        self.inner.state_tx.send_replace(SessionSnapshot {
            state,
            resolved: self.inner.resolved.load(Ordering::SeqCst),
            user,
            generation: self.generation(),
        });
    }

    fn mark_resolved(&self) {
        self.inner.resolved.store(true, Ordering::SeqCst);
        self.publish();
    }

    /// Run `apply` only if no login/logout happened since `generation`.
    fn commit<T>(&self, generation: u64, apply: impl FnOnce() -> AuthResult<T>) -> AuthResult<T> {
        let _guard = self.inner.commit_lock.lock();
        if self.generation() != generation {
            return Err(AuthError::Superseded);
        }
        apply()
    }

    /// Seed the session from storage and validate it with the authority.
    ///
    /// Valid tokens lead to `Authenticated`. A rejected token gets exactly one
    /// refresh attempt; if that fails the store is cleared. When the authority
    /// cannot be reached the stored session is kept for the next start and the
    /// error is returned.
    pub async fn start(&self) -> AuthResult<SessionState> {
        let generation = self.generation();

        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(StorageError::Encoding(e)) => {
                warn!(error = %e, "Stored session is unreadable, clearing it");
                if let Err(e) = self.inner.store.clear() {
                    self.mark_resolved();
                    return Err(e.into());
                }
                None
            }
            Err(e) => {
                self.mark_resolved();
                return Err(e.into());
            }
        };

        let Some(stored) = stored else {
            info!("No stored session found on startup");
            self.mark_resolved();
            return Ok(self.state());
        };

        self.transition(&SessionMachineInput::StoredSessionFound)?;
        *self.inner.session.lock() = Some(stored.clone());
        info!(user_id = %stored.user.id, "Stored session found, validating with authority");

        match self.inner.authority.validate(&stored.access_token).await {
            Ok(fresh_user) => {
                let user_changed = fresh_user.as_ref().is_some_and(|u| *u != stored.user);
                let user = fresh_user.unwrap_or_else(|| stored.user.clone());

                let committed = self.commit(generation, || {
                    // Keep tokens a concurrent refresh may have rotated
                    let current = self.inner.session.lock().clone().unwrap_or(stored);
                    let session = Session { user, ..current };
                    if user_changed {
                        self.inner.store.save(&session)?;
                    }
                    let user_id = session.user.id.clone();
                    *self.inner.session.lock() = Some(session);
                    self.inner.resolved.store(true, Ordering::SeqCst);
                    self.transition(&SessionMachineInput::SessionValidated)?;
                    Ok(user_id)
                });

                match committed {
                    Ok(user_id) => {
                        self.arm_timer();
                        info!(user_id = %user_id, "Session validated on startup");
                    }
                    Err(AuthError::Superseded) => {
                        debug!("Startup validation result discarded");
                    }
                    Err(e) => {
                        self.expire(generation, "validated session could not be stored");
                        self.mark_resolved();
                        return Err(e);
                    }
                }
            }
            Err(AuthError::SessionInvalid(reason)) => {
                info!(reason = %reason, "Stored session rejected, attempting refresh");
                let rejected = self.commit(generation, || {
                    self.transition(&SessionMachineInput::SessionRejected)
                });
                if rejected.is_ok() {
                    let outcome = self.refresh().await;
                    if !outcome.is_success() {
                        info!(outcome = ?outcome, "Startup refresh failed, session cleared");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not validate stored session; keeping it for next start");
                let _ = self.commit(generation, || {
                    self.inner.session.lock().take();
                    self.inner.resolved.store(true, Ordering::SeqCst);
                    self.transition(&SessionMachineInput::SessionExpired)
                });
                self.mark_resolved();
                return Err(e);
            }
        }

        self.mark_resolved();
        Ok(self.state())
    }

    /// Login with email and password.
    ///
    /// - Unauthenticated -> Authenticating -> (Authenticated | Unauthenticated)
    ///
    /// `remember_me` controls whether the refresh token is written to durable
    /// storage.
    pub async fn login(&self, email: &str, password: &str, remember_me: bool) -> AuthResult<User> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::Validation("email is required".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password is required".to_string()));
        }

        self.transition(&SessionMachineInput::LoginRequested)?;
        let generation = self.bump_generation();
        debug!(email = %email, generation, "Attempting login");

        let data = match self.inner.authority.login(email, password).await {
            Ok(data) => data,
            Err(e) => {
                if let Err(AuthError::Superseded) = self.commit(generation, || {
                    self.transition(&SessionMachineInput::LoginFailed)
                }) {
                    debug!(generation, "Login failure arrived after logout");
                }
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };

        let session = Session {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            user: data.user,
        };

        let committed = self.commit(generation, || {
            self.inner.store.set_remember_me(remember_me)?;
            self.inner.store.save(&session)?;
            *self.inner.session.lock() = Some(session.clone());
            self.inner.resolved.store(true, Ordering::SeqCst);
            self.transition(&SessionMachineInput::LoginSucceeded)
        });

        if let Err(e) = committed {
            if !matches!(e, AuthError::Superseded) {
                let _ = self.commit(generation, || {
                    self.inner.session.lock().take();
                    self.transition(&SessionMachineInput::LoginFailed)
                });
            }
            return Err(e);
        }

        self.arm_timer();
        info!(
            user_id = %session.user.id,
            role = %session.user.role,
            remember_me,
            "Login successful"
        );
        Ok(session.user)
    }

    /// Logout: clear local state first, then tell the authority (best effort).
    ///
    /// Safe to call repeatedly; a second call finds nothing to clear.
    pub async fn logout(&self) -> AuthResult<()> {
        let (previous, cleared) = {
            let _guard = self.inner.commit_lock.lock();
            self.bump_generation();
            let previous = self.inner.session.lock().take();
            self.disarm_timer();
            let cleared = self.inner.store.clear();
            self.inner.resolved.store(true, Ordering::SeqCst);
            self.transition(&SessionMachineInput::LogoutRequested)?;
            (previous, cleared)
        };

        if let Some(session) = previous {
            if let Err(e) = self.inner.authority.logout(&session.access_token).await {
                warn!(error = %e, "Authority logout failed; local session already cleared");
            }
            info!(user_id = %session.user.id, "Logged out");
        } else {
            debug!("Logout requested with no active session");
        }

        cleared?;
        Ok(())
    }

    /// Refresh the access token. Concurrent callers share one exchange.
    ///
    /// On failure the session is expired (state `Unauthenticated`, store
    /// cleared) unless a login or logout already superseded it.
    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.generation();
        let inner = self.inner.clone();

        self.inner
            .refresh_flight
            .run(generation, move || {
                let manager = SessionManager { inner };
                async move { manager.run_refresh(generation).await }
            })
            .await
    }

    async fn run_refresh(&self, generation: u64) -> RefreshOutcome {
        let Some(candidate) = self.inner.session.lock().clone() else {
            debug!(generation, "No session held, nothing to refresh");
            return RefreshOutcome::NoRefreshToken;
        };

        if self.state() == SessionState::Authenticated {
            let _ = self.commit(generation, || {
                self.transition(&SessionMachineInput::RefreshStarted)
            });
        }

        match exchange_refresh_token(self.inner.authority.as_ref(), Some(candidate)).await {
            Ok(session) => {
                let committed = self.commit(generation, || {
                    self.inner.store.save(&session)?;
                    *self.inner.session.lock() = Some(session.clone());
                    if self.state() == SessionState::Refreshing {
                        self.transition(&SessionMachineInput::RefreshSucceeded)?;
                    } else {
                        self.publish();
                    }
                    Ok(self.state() == SessionState::Authenticated)
                });

                match committed {
                    Ok(authenticated) => {
                        if authenticated {
                            self.arm_timer();
                        }
                        info!(user_id = %session.user.id, "Access token refreshed");
                        RefreshOutcome::Refreshed
                    }
                    Err(AuthError::Superseded) => {
                        debug!(generation, "Refresh result discarded, session changed meanwhile");
                        RefreshOutcome::Stale
                    }
                    Err(e) => {
                        let outcome = RefreshOutcome::from(&e);
                        self.expire(generation, "refreshed session could not be stored");
                        outcome
                    }
                }
            }
            Err(outcome) => {
                if self.generation() != generation {
                    return RefreshOutcome::Stale;
                }
                self.expire(generation, "token refresh failed");
                outcome
            }
        }
    }

    /// Drop the session after an unrecoverable failure.
    pub(crate) fn expire(&self, generation: u64, reason: &str) {
        let _guard = self.inner.commit_lock.lock();
        if self.generation() != generation {
            return;
        }

        self.bump_generation();
        let had_session = self.inner.session.lock().take().is_some();
        self.disarm_timer();
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }

        let input = match self.state() {
            SessionState::Unauthenticated => None,
            SessionState::Refreshing => Some(SessionMachineInput::RefreshFailed),
            SessionState::Authenticating | SessionState::Authenticated => {
                Some(SessionMachineInput::SessionExpired)
            }
        };
        match input {
            Some(input) => {
                if let Err(e) = self.transition(&input) {
                    warn!(error = %e, "Unexpected state while expiring session");
                }
            }
            None => self.publish(),
        }

        if had_session {
            warn!(reason = %reason, "Session expired");
        }
    }

    fn arm_timer(&self) {
        let mut timer = self.inner.timer.lock();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.refresh_interval;

        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = SessionManager { inner };
                debug!("Periodic token refresh");
                if !manager.refresh().await.is_success() {
                    break;
                }
            }
        }));
        debug!(interval_secs = period.as_secs(), "Refresh timer armed");
    }

    fn disarm_timer(&self) {
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
            debug!("Refresh timer disarmed");
        }
    }

    /// Teardown: cancel the periodic refresh. The session itself is kept.
    pub fn shutdown(&self) {
        self.disarm_timer();
    }
}
