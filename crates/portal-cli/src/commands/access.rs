//! Route access commands.

use super::restore_session;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use portal_auth::{AccessRequirement, AdminLevel, Decision, Permission, PortalAuthRuntime, Role};
use serde_json::json;

/// Check whether the current user may open a route with these requirements.
pub async fn authorize(
    runtime: &PortalAuthRuntime,
    role: Option<Role>,
    admin_level: Option<String>,
    permission: Option<Permission>,
    format: &OutputFormat,
) -> Result<()> {
    restore_session(runtime, format).await;

    let requirement = AccessRequirement {
        role,
        admin_level: admin_level.map(AdminLevel::from),
        permission,
    };
    let decision = runtime.authorize(&requirement);

    match format {
        OutputFormat::Text => match &decision {
            Decision::Allow => println!("allow"),
            Decision::Redirect(target) => println!("redirect {}", target),
            Decision::Pending => println!("pending"),
        },
        OutputFormat::Json => output::print_json(&decision),
    }

    Ok(())
}

/// Print the post-login landing route for the current user.
pub async fn landing(runtime: &PortalAuthRuntime, format: &OutputFormat) -> Result<()> {
    restore_session(runtime, format).await;

    match runtime.landing_route() {
        Some(route) => match format {
            OutputFormat::Text => println!("{}", route),
            OutputFormat::Json => output::print_json(&json!({"landing": route})),
        },
        None => output::print_error("Not logged in", format),
    }

    Ok(())
}
