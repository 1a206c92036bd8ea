//! Portal-oriented authentication runtime.
//!
//! Wires the session manager, API client and access gate to one credential
//! store and one authority, so the CLI (or any other front end) talks to a
//! single object for login/logout/status, API calls and route checks.

use crate::authority::{AuthAuthority, HttpAuthority};
use crate::client::{ApiRequest, ApiResponse, HttpTransport, SessionClient, Transport};
use crate::gate::{AccessGate, AccessRequirement, Decision, DenyAllPolicy, RoutingTable};
use crate::session::SessionManager;
use crate::{AuthResult, SessionState};
use chrono::{DateTime, Utc};
use portal_config_and_utils::{Config, Paths};
use portal_storage::{create_credential_store, CredentialStore, User};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Snapshot of authentication state for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub authenticated: bool,
    pub state: SessionState,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub remember_me: bool,
}

/// Shared portal auth runtime.
#[derive(Clone)]
pub struct PortalAuthRuntime {
    session: SessionManager,
    client: SessionClient,
    gate: Arc<AccessGate>,
}

impl PortalAuthRuntime {
    /// Assemble a runtime from explicit parts.
    pub fn new(
        store: CredentialStore,
        authority: Arc<dyn AuthAuthority>,
        transport: Arc<dyn Transport>,
        gate: AccessGate,
        config: &Config,
    ) -> Self {
        let session =
            SessionManager::with_refresh_interval(store, authority, config.refresh_interval());
        let client = SessionClient::new(session.clone(), transport);
        Self {
            session,
            client,
            gate: Arc::new(gate),
        }
    }

    /// Build the default HTTP-backed runtime for `config` and `paths`.
    ///
    /// Credentials live in the file store under `paths`; the routing table is
    /// read from `routes.json` there when present.
    pub fn from_config(config: &Config, paths: &Paths) -> AuthResult<Self> {
        let api_url = config.api_url()?;
        let timeout = config.request_timeout();

        let store = create_credential_store(paths)?;
        let authority = HttpAuthority::new(api_url.clone(), timeout)?;
        let transport = HttpTransport::new(api_url.clone(), timeout)?;
        let routes = RoutingTable::load_or_default(&paths.routes_file())?;
        let gate = AccessGate::new(routes, Arc::new(DenyAllPolicy));

        debug!(api_url = %api_url, base_dir = %paths.base_dir().display(), "Portal auth runtime created");
        Ok(Self::new(
            store,
            Arc::new(authority),
            Arc::new(transport),
            gate,
            config,
        ))
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Validate the persisted session and refresh it if needed.
    pub async fn start(&self) -> AuthResult<SessionState> {
        self.session.start().await
    }

    /// Login and return the user with their landing route.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> AuthResult<(User, String)> {
        let user = self.session.login(email, password, remember_me).await?;
        let landing = self.gate.routes().landing_for(&user).to_string();
        info!(user_id = %user.id, landing = %landing, "Portal login complete");
        Ok((user, landing))
    }

    pub async fn logout(&self) -> AuthResult<()> {
        self.session.logout().await
    }

    /// Current auth status snapshot.
    pub fn status(&self) -> AuthResult<AuthSnapshot> {
        let snapshot = self.session.snapshot();
        let store = self.session.store();
        let record = store.load_record()?;

        Ok(AuthSnapshot {
            authenticated: snapshot.state.is_authenticated(),
            state: snapshot.state,
            resolved: snapshot.resolved,
            user: snapshot.user,
            saved_at: record.map(|r| r.saved_at),
            remember_me: store.remember_me()?,
        })
    }

    /// Issue an API request through the session client.
    pub async fn request(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.client.request(request).await
    }

    /// Check a route's requirements against the current session.
    pub fn authorize(&self, requirement: &AccessRequirement) -> Decision {
        self.gate.authorize(&self.session.snapshot(), requirement)
    }

    /// Post-login landing route for the current user, if logged in.
    pub fn landing_route(&self) -> Option<String> {
        self.session
            .current_user()
            .map(|user| self.gate.routes().landing_for(&user).to_string())
    }

    /// Teardown: stop background refresh.
    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}
