//! Client for the external authentication authority.
//!
//! Four endpoints are used, all relative to the configured API base URL:
//!
//! | Call | Endpoint | Credential |
//! |------|----------|------------|
//! | login | `POST /auth/login` | none, `{email, password}` body |
//! | refresh | `POST /auth/refresh` | refresh token as bearer |
//! | validate | `GET /auth/validate` | access token as bearer |
//! | logout | `POST /auth/logout` | access token as bearer |

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use portal_storage::User;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Successful login payload.
#[derive(Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: User,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("user", &self.user)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default = "default_valid")]
    valid: bool,
    #[serde(default)]
    user: Option<User>,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Operations offered by the authentication authority.
#[async_trait]
pub trait AuthAuthority: Send + Sync {
    /// Exchange email and password for a session.
    async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<String>;

    /// Check an access token. Returns the user when the authority includes one.
    async fn validate(&self, access_token: &str) -> AuthResult<Option<User>>;

    /// Tell the authority the session is over.
    async fn logout(&self, access_token: &str) -> AuthResult<()>;
}

/// Hash a response body so failures can be correlated without logging content.
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Pull `message` out of a JSON error body, falling back to `API error: <status>`.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("API error: {}", status.as_u16()))
}

/// Join an endpoint path onto the API base URL.
///
/// The base URL may carry a path prefix (`https://host/api`); it is kept.
/// Absolute and scheme-relative endpoints are rejected so a request never
/// leaves the API host.
pub(crate) fn endpoint_url(base: &Url, endpoint: &str) -> AuthResult<Url> {
    let trimmed = endpoint.trim();
    let outside = || {
        AuthError::Validation(format!(
            "endpoint must be a path relative to the API URL: {}",
            endpoint
        ))
    };
    if trimmed.starts_with("//")
        || trimmed.starts_with("\\\\")
        || Url::parse(trimmed).is_ok()
    {
        return Err(outside());
    }

    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let url = base.join(trimmed.trim_start_matches('/'))?;
    if url.origin() != base.origin() {
        return Err(outside());
    }
    Ok(url)
}

/// `AuthAuthority` over the portal backend's HTTP API.
#[derive(Clone)]
pub struct HttpAuthority {
    http_client: Client,
    api_url: Url,
}

impl HttpAuthority {
    /// Create a client for the given API base URL.
    pub fn new(api_url: Url, timeout: Duration) -> AuthResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_url,
        })
    }

    /// Create a client sharing an existing `reqwest::Client`.
    pub fn with_client(http_client: Client, api_url: Url) -> Self {
        Self {
            http_client,
            api_url,
        }
    }

    fn url(&self, endpoint: &str) -> AuthResult<Url> {
        endpoint_url(&self.api_url, endpoint)
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(response: Response) -> AuthResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!(body = %summarize_response_body(&body), error = %e, "Unexpected response shape");
            AuthError::MalformedResponse(e.to_string())
        })
    }
}

#[async_trait]
impl AuthAuthority for HttpAuthority {
    async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        let url = self.url("/auth/login")?;
        debug!(url = %url, email = %email, "Attempting email/password login");

        let response = self
            .http_client
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!(
                status = %status,
                body = %summarize_response_body(&body),
                "Login failed"
            );
            if status.is_client_error() {
                return Err(AuthError::InvalidCredentials(message));
            }
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: LoginResponse = Self::read_json(response).await?;
        info!(user_id = %data.user.id, role = %data.user.role, "Login accepted by authority");
        Ok(data)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<String> {
        let url = self.url("/auth/refresh")?;
        debug!(url = %url, "Refreshing access token");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(refresh_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                body = %summarize_response_body(&body),
                "Token refresh failed"
            );
            return Err(AuthError::RefreshRejected {
                status: status.as_u16(),
            });
        }

        let data: RefreshResponse = Self::read_json(response).await?;
        Ok(data.access_token)
    }

    async fn validate(&self, access_token: &str) -> AuthResult<Option<User>> {
        let url = self.url("/auth/validate")?;
        debug!(url = %url, "Validating session with authority");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                body = %summarize_response_body(&body),
                "Session validation failed"
            );
            if status.is_server_error() {
                return Err(AuthError::Api {
                    status: status.as_u16(),
                    message: error_message(status, &body),
                });
            }
            return Err(AuthError::SessionInvalid(format!("HTTP {}", status.as_u16())));
        }

        // Some deployments answer 200 with an empty body
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let data: ValidateResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if !data.valid {
            return Err(AuthError::SessionInvalid("authority reported invalid".to_string()));
        }
        Ok(data.user)
    }

    async fn logout(&self, access_token: &str) -> AuthResult<()> {
        let url = self.url("/auth/logout")?;
        debug!(url = %url, "Notifying authority of logout");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: format!("API error: {}", status.as_u16()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_body_message() {
        let msg = error_message(StatusCode::UNAUTHORIZED, r#"{"message":"Invalid credentials"}"#);
        assert_eq!(msg, "Invalid credentials");
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "API error: 502"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"message":"  "}"#),
            "API error: 404"
        );
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let base = Url::parse("https://portal.example.com/api").unwrap();
        assert_eq!(
            endpoint_url(&base, "/auth/login").unwrap().as_str(),
            "https://portal.example.com/api/auth/login"
        );

        let base = Url::parse("http://localhost:3001").unwrap();
        assert_eq!(
            endpoint_url(&base, "/markets?page=2").unwrap().as_str(),
            "http://localhost:3001/markets?page=2"
        );
    }

    #[test]
    fn test_endpoint_url_rejects_other_hosts() {
        let base = Url::parse("http://localhost:3001").unwrap();
        for endpoint in [
            "https://evil.example/steal",
            "//evil.example/steal",
            "  http://evil.example",
            "mailto:someone@example.com",
            "/\\\\evil.example/steal",
        ] {
            let err = endpoint_url(&base, endpoint).unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)), "{endpoint}");
        }

        let url = endpoint_url(&base, "/vendors/https-settings").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
    }

    #[test]
    fn test_summarize_response_body_hides_content() {
        let summary = summarize_response_body(r#"{"access_token":"secret"}"#);
        assert!(summary.starts_with("len=25,"));
        assert!(!summary.contains("secret"));
    }

    #[test]
    fn test_login_response_accepts_missing_refresh_token() {
        let json = r#"{
            "access_token": "T1",
            "user": {"id":"u-1","email":"a@x.com","role":"STAKEHOLDER","kycStatus":"PENDING"}
        }"#;
        let data: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(data.access_token, "T1");
        assert!(data.refresh_token.is_none());
        assert!(!format!("{:?}", data).contains("T1"));
    }
}
