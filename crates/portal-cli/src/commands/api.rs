//! Authenticated API requests.

use super::restore_session;
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use portal_auth::{ApiRequest, AuthError, Method, PortalAuthRuntime};
use serde_json::json;

/// Parse an HTTP method name, case-insensitively.
pub(crate) fn parse_method(method: &str) -> Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => {
            Method::from_bytes(upper.as_bytes()).context("invalid HTTP method")
        }
        _ => anyhow::bail!("Unsupported method: {}", method),
    }
}

/// Send a request to the portal backend with the current session.
pub async fn request(
    runtime: &PortalAuthRuntime,
    method: &str,
    endpoint: &str,
    data: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let method = parse_method(method)?;
    let body = data
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--data is not valid JSON")?;

    restore_session(runtime, format).await;

    let mut request = ApiRequest::new(method, endpoint);
    if let Some(body) = body {
        request = request.with_body(body);
    }

    match runtime.request(request).await {
        Ok(response) => match format {
            OutputFormat::Text => output::print_body(&response.body),
            OutputFormat::Json => {
                let body = response
                    .json::<serde_json::Value>()
                    .unwrap_or_else(|_| serde_json::Value::String(response.body.clone()));
                output::print_json(&json!({"status": response.status, "body": body}));
            }
        },
        Err(AuthError::SessionExpired) => {
            output::print_error("Session expired. Log in again with 'portal login'", format);
        }
        Err(e) => output::print_error(&e.to_string(), format),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method("get").unwrap(), Method::GET);
        assert_eq!(parse_method(" Delete ").unwrap(), Method::DELETE);
        assert!(parse_method("TRACE").is_err());
        assert!(parse_method("").is_err());
    }
}
