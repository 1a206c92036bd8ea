//! Market portal CLI - session management against the portal backend.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use output::OutputFormat;
use portal_auth::{Permission, PortalAuthRuntime, Role};
use portal_config_and_utils::{init_logging, Config, Paths};
use tracing::debug;

/// Market portal CLI - log in, inspect the session and call the portal API.
#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Market portal CLI for authentication and API access")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted for when omitted)
        #[arg(short, long)]
        email: Option<String>,

        /// Keep the refresh token on disk so the session survives restarts
        #[arg(long)]
        remember_me: bool,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Send an authenticated request to the portal API
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Endpoint path relative to the API URL, e.g. /markets
        endpoint: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Check whether the current user may open a route
    Authorize {
        /// Required role (ADMIN or STAKEHOLDER)
        #[arg(long)]
        role: Option<Role>,

        /// Required admin level, e.g. MARKET_MASTER
        #[arg(long)]
        admin_level: Option<String>,

        /// Required permission as resource[:action][@market]
        #[arg(long)]
        permission: Option<Permission>,
    },

    /// Print the post-login landing route for the current user
    Landing,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let config = Config::load(&paths)?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    init_logging("portal-cli", &level, &paths, false);
    debug!(api_url = %config.api_url, "Starting portal CLI");

    let runtime = PortalAuthRuntime::from_config(&config, &paths)?;
    let format = cli.format;

    let result = match cli.command {
        Commands::Login { email, remember_me } => {
            commands::login(&runtime, email, remember_me, &format).await
        }
        Commands::Logout => commands::logout(&runtime, &format).await,
        Commands::Status => commands::status(&runtime, &format).await,
        Commands::Request {
            method,
            endpoint,
            data,
        } => commands::request(&runtime, &method, &endpoint, data.as_deref(), &format).await,
        Commands::Authorize {
            role,
            admin_level,
            permission,
        } => commands::authorize(&runtime, role, admin_level, permission, &format).await,
        Commands::Landing => commands::landing(&runtime, &format).await,
    };

    runtime.shutdown();
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_login_flags() {
        let cli = Cli::try_parse_from(["portal", "login", "--email", "a@x.com", "--remember-me"])
            .unwrap();
        match cli.command {
            Commands::Login { email, remember_me } => {
                assert_eq!(email.as_deref(), Some("a@x.com"));
                assert!(remember_me);
            }
            _ => panic!("expected login"),
        }
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_parse_global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["portal", "status", "--format", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_parse_request_with_data() {
        let cli = Cli::try_parse_from([
            "portal",
            "request",
            "post",
            "/markets",
            "--data",
            r#"{"name":"Central"}"#,
        ])
        .unwrap();
        match cli.command {
            Commands::Request {
                method,
                endpoint,
                data,
            } => {
                assert_eq!(method, "post");
                assert_eq!(endpoint, "/markets");
                assert_eq!(data.as_deref(), Some(r#"{"name":"Central"}"#));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn test_parse_authorize_requirements() {
        let cli = Cli::try_parse_from([
            "portal",
            "authorize",
            "--role",
            "ADMIN",
            "--admin-level",
            "MARKET_MASTER",
            "--permission",
            "vendors:write@m-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Authorize {
                role,
                admin_level,
                permission,
            } => {
                assert_eq!(role, Some(Role::Admin));
                assert_eq!(admin_level.as_deref(), Some("MARKET_MASTER"));
                assert_eq!(
                    permission,
                    Some(Permission::new("vendors", "WRITE").in_market("m-1"))
                );
            }
            _ => panic!("expected authorize"),
        }
    }

    #[test]
    fn test_rejects_unknown_role() {
        assert!(Cli::try_parse_from(["portal", "authorize", "--role", "VENDOR"]).is_err());
    }
}
