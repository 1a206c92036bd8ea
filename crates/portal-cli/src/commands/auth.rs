//! Authentication commands.

use super::restore_session;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use portal_auth::{AuthError, ErrorKind, PortalAuthRuntime};
use serde_json::json;
use std::io::{self, Write};

/// Login with email and password.
pub async fn login(
    runtime: &PortalAuthRuntime,
    email: Option<String>,
    remember_me: bool,
    format: &OutputFormat,
) -> Result<()> {
    restore_session(runtime, format).await;

    if let Some(user) = runtime.session().current_user() {
        output::print_success(&format!("Already logged in as {}", user.email), format);
        return Ok(());
    }

    let email = match email {
        Some(email) => email,
        None => {
            print!("Email: ");
            io::stdout().flush()?;
            let mut email = String::new();
            io::stdin().read_line(&mut email)?;
            email
        }
    };
    let email = email.trim().to_string();

    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(());
    }

    // Prompt for password (hidden)
    let password = rpassword::prompt_password("Password: ")?;

    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(());
    }

    if *format == OutputFormat::Text {
        println!("Logging in...");
    }

    match runtime.login(&email, &password, remember_me).await {
        Ok((user, landing)) => match format {
            OutputFormat::Text => {
                println!("Logged in as {} ({})", user.display_name(), user.role);
                output::print_row("Landing", &landing);
            }
            OutputFormat::Json => output::print_json(&json!({
                "status": "success",
                "user": user,
                "landing": landing,
            })),
        },
        Err(e) => {
            let message = match e.kind() {
                ErrorKind::Network => format!("Login failed, backend unreachable: {}", e),
                _ => format!("Login failed: {}", e),
            };
            output::print_error(&message, format);
        }
    }

    Ok(())
}

/// Logout and clear session.
pub async fn logout(runtime: &PortalAuthRuntime, format: &OutputFormat) -> Result<()> {
    // A restored session lets the authority be told about the logout
    restore_session(runtime, format).await;

    match runtime.logout().await {
        Ok(()) => output::print_success("Logged out successfully", format),
        Err(AuthError::Storage(e)) => {
            output::print_error(&format!("Logged out, but credentials could not be removed: {}", e), format)
        }
        Err(e) => output::print_error(&e.to_string(), format),
    }

    Ok(())
}

/// Check authentication status.
pub async fn status(runtime: &PortalAuthRuntime, format: &OutputFormat) -> Result<()> {
    restore_session(runtime, format).await;
    let snapshot = runtime.status()?;

    match format {
        OutputFormat::Text => {
            output::print_row("State", &snapshot.state.to_string());
            match &snapshot.user {
                Some(user) => {
                    output::print_row("Auth", "logged in");
                    output::print_row("User", &user.display_name());
                    output::print_row("Email", &user.email);
                    output::print_row("Role", user.role.as_str());
                    if let Some(level) = &user.admin_level {
                        output::print_row("Admin level", level.as_str());
                    }
                    if let Some(kyc) = &user.kyc_status {
                        output::print_row("KYC", kyc.as_str());
                    }
                }
                None => output::print_row("Auth", "not logged in"),
            }
            if let Some(saved_at) = snapshot.saved_at {
                output::print_row("Saved", &saved_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
            }
            output::print_row("Remember me", if snapshot.remember_me { "yes" } else { "no" });
        }
        OutputFormat::Json => output::print_json(&snapshot),
    }

    Ok(())
}
