//! Authentication for the market portal client.
//!
//! This crate provides:
//! - A client for the authentication authority (login, refresh, validate, logout)
//! - Session management with startup validation and periodic token refresh
//! - Single-flight token refresh shared by every caller
//! - An API client that refreshes once and retries on 401
//! - Route access decisions driven by an injectable routing table
//! - Explicit FSM-based session state management

mod auth_fsm;
mod authority;
mod client;
mod error;
mod gate;
mod portal_runtime;
mod refresh;
mod session;

pub use auth_fsm::session_machine;
pub use auth_fsm::{
    SessionMachine, SessionMachineInput, SessionMachineState, SessionSnapshot, SessionState,
};
pub use authority::{AuthAuthority, HttpAuthority, LoginResponse};
pub use client::{ApiRequest, ApiResponse, HttpTransport, SessionClient, Transport, MAX_AUTH_RETRIES};
pub use error::{AuthError, AuthResult, ErrorKind};
pub use gate::{
    AccessGate, AccessRequirement, Decision, DenyAllPolicy, Permission, PermissionPolicy,
    RoutingTable, StaticPolicy,
};
pub use portal_runtime::{AuthSnapshot, PortalAuthRuntime};
pub use refresh::{exchange_refresh_token, RefreshOutcome, SingleFlight};
pub use session::{SessionManager, DEFAULT_REFRESH_INTERVAL};

pub use portal_storage::{AdminLevel, KycStatus, Role, Session, User};
pub use reqwest::Method;
