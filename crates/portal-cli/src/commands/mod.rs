//! CLI command implementations.

mod access;
mod api;
mod auth;

pub use access::{authorize, landing};
pub use api::request;
pub use auth::{login, logout, status};

use crate::output::{self, OutputFormat};
use portal_auth::{AuthError, PortalAuthRuntime, SessionState};
use tracing::debug;

/// Restore the stored session before running a command.
///
/// An unreachable backend is reported but does not abort the command; the
/// stored session is kept for the next run.
async fn restore_session(runtime: &PortalAuthRuntime, format: &OutputFormat) -> SessionState {
    match runtime.start().await {
        Ok(state) => {
            debug!(state = %state, "Session restored");
            state
        }
        Err(e @ (AuthError::Http(_) | AuthError::Api { .. } | AuthError::MalformedResponse(_))) => {
            output::print_error(&format!("Could not reach the portal backend: {}", e), format);
            runtime.session().state()
        }
        Err(e) => {
            output::print_error(&format!("Could not restore session: {}", e), format);
            runtime.session().state()
        }
    }
}
