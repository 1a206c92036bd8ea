//! Single-flight access token refresh.
//!
//! Concurrent callers asking for a refresh while one is already running for
//! the same session generation await that flight instead of starting another.
//! The slot is cleared once the flight completes, so the next caller after
//! that starts a fresh exchange.

use crate::authority::AuthAuthority;
use crate::AuthError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use portal_storage::Session;
use std::future::Future;
use tracing::{debug, warn};

/// Result of one refresh flight, shared by every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token was persisted and published.
    Refreshed,
    /// No session, or a session without a refresh token.
    NoRefreshToken,
    /// The authority refused the refresh token.
    Rejected { status: u16 },
    /// Transport failure or malformed response.
    NetworkFailure(String),
    /// The new token could not be persisted.
    StorageFailure(String),
    /// A login or logout happened mid-flight; the result was discarded.
    Stale,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

impl From<&AuthError> for RefreshOutcome {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::RefreshRejected { status } => RefreshOutcome::Rejected { status: *status },
            AuthError::Storage(e) => RefreshOutcome::StorageFailure(e.to_string()),
            other => RefreshOutcome::NetworkFailure(other.to_string()),
        }
    }
}

type Flight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Coalesces concurrent refreshes into one underlying call.
#[derive(Default)]
pub struct SingleFlight {
    slot: Mutex<Option<(u64, Flight)>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the flight for `generation`, or start one with `start`.
    ///
    /// `start` is only invoked when no flight for this generation is running.
    pub async fn run<F, Fut>(&self, generation: u64, start: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let flight = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some((flight_generation, flight)) if *flight_generation == generation => {
                    debug!(generation, "Joining in-flight refresh");
                    flight.clone()
                }
                _ => {
                    let flight = start().boxed().shared();
                    *slot = Some((generation, flight.clone()));
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|(_, current)| current.ptr_eq(&flight))
        {
            *slot = None;
        }

        outcome
    }

    /// Whether a flight is currently registered.
    pub fn in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Exchange the session's refresh token for a new access token.
///
/// Never touches stored state: on success the caller receives the refreshed
/// session to persist, on failure the outcome describing why.
pub async fn exchange_refresh_token(
    authority: &dyn AuthAuthority,
    session: Option<Session>,
) -> Result<Session, RefreshOutcome> {
    let Some(session) = session else {
        debug!("Refresh requested without a session");
        return Err(RefreshOutcome::NoRefreshToken);
    };
    let Some(refresh_token) = session.refresh_token.as_deref() else {
        debug!(user_id = %session.user.id, "Refresh requested but no refresh token is held");
        return Err(RefreshOutcome::NoRefreshToken);
    };

    match authority.refresh(refresh_token).await {
        Ok(access_token) => Ok(session.with_access_token(access_token)),
        Err(e) => {
            warn!(user_id = %session.user.id, error = %e, "Refresh exchange failed");
            Err(RefreshOutcome::from(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::LoginResponse;
    use crate::AuthResult;
    use async_trait::async_trait;
    use portal_storage::{Role, User};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingAuthority {
        refresh_calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl AuthAuthority for CountingAuthority {
        async fn login(&self, _email: &str, _password: &str) -> AuthResult<LoginResponse> {
            unreachable!("login is not used here")
        }

        async fn refresh(&self, refresh_token: &str) -> AuthResult<String> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject {
                return Err(AuthError::RefreshRejected { status: 401 });
            }
            Ok(format!("{refresh_token}-access-{n}"))
        }

        async fn validate(&self, _access_token: &str) -> AuthResult<Option<User>> {
            Ok(None)
        }

        async fn logout(&self, _access_token: &str) -> AuthResult<()> {
            Ok(())
        }
    }

    fn session(refresh_token: Option<&str>) -> Session {
        Session {
            access_token: "T1".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            user: User {
                id: "u-1".to_string(),
                email: "a@x.com".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                role: Role::Stakeholder,
                admin_level: None,
                kyc_status: None,
            },
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_flight() {
        let flight = Arc::new(SingleFlight::new());
        let starts = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run(1, || {
                        starts.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            RefreshOutcome::Refreshed
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), RefreshOutcome::Refreshed);
        }
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn sequential_calls_start_new_flights() {
        let flight = SingleFlight::new();
        let starts = AtomicUsize::new(0);

        for _ in 0..3 {
            let outcome = flight
                .run(1, || {
                    starts.fetch_add(1, Ordering::SeqCst);
                    async { RefreshOutcome::Rejected { status: 401 } }
                })
                .await;
            assert_eq!(outcome, RefreshOutcome::Rejected { status: 401 });
        }
        assert_eq!(starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn new_generation_does_not_join_old_flight() {
        let flight = Arc::new(SingleFlight::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let old = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run(1, || async move {
                        let _ = release_rx.await;
                        RefreshOutcome::Stale
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(flight.in_flight());

        let fresh = flight
            .run(2, || async { RefreshOutcome::Refreshed })
            .await;
        assert_eq!(fresh, RefreshOutcome::Refreshed);

        release_tx.send(()).unwrap();
        assert_eq!(old.await.unwrap(), RefreshOutcome::Stale);
    }

    #[tokio::test]
    async fn exchange_without_refresh_token_makes_no_call() {
        let authority = CountingAuthority {
            refresh_calls: AtomicUsize::new(0),
            reject: false,
        };

        let outcome = exchange_refresh_token(&authority, Some(session(None))).await;
        assert_eq!(outcome.unwrap_err(), RefreshOutcome::NoRefreshToken);

        let outcome = exchange_refresh_token(&authority, None).await;
        assert_eq!(outcome.unwrap_err(), RefreshOutcome::NoRefreshToken);

        assert_eq!(authority.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exchange_replaces_only_access_token() {
        let authority = CountingAuthority {
            refresh_calls: AtomicUsize::new(0),
            reject: false,
        };
        let original = session(Some("R1"));

        let refreshed = exchange_refresh_token(&authority, Some(original.clone()))
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, "R1-access-1");
        assert_eq!(refreshed.refresh_token, original.refresh_token);
        assert_eq!(refreshed.user, original.user);
    }

    #[tokio::test]
    async fn exchange_maps_rejection() {
        let authority = CountingAuthority {
            refresh_calls: AtomicUsize::new(0),
            reject: true,
        };

        let outcome = exchange_refresh_token(&authority, Some(session(Some("R1")))).await;
        assert_eq!(outcome.unwrap_err(), RefreshOutcome::Rejected { status: 401 });
    }
}
