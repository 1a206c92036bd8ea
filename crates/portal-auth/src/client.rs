//! Authenticated API client.
//!
//! Every request carries the current access token. A 401 triggers one token
//! refresh (shared with any other caller that hit a 401 at the same time) and
//! one retry of the same request with the new token. If the refresh fails the
//! session is expired and the caller gets `AuthError::SessionExpired`.

use crate::authority::{endpoint_url, error_message, summarize_response_body};
use crate::session::SessionManager;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Automatic retries after a 401, per request.
pub const MAX_AUTH_RETRIES: u32 = 1;

const CONTENT_TYPE: &str = "Content-Type";
const AUTHORIZATION: &str = "Authorization";

/// An API call relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
    /// Caller headers. These override defaults but never the bearer header.
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, endpoint).with_body(body)
    }

    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, endpoint).with_body(body)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header case-insensitively; the last occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Final header set: defaults, then caller headers, then the bearer.
    pub(crate) fn prepared(&self, bearer: Option<&str>) -> ApiRequest {
        let mut headers = vec![(CONTENT_TYPE.to_string(), "application/json".to_string())];

        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case(AUTHORIZATION) {
                continue;
            }
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value.clone()));
        }

        if let Some(token) = bearer {
            headers.push((AUTHORIZATION.to_string(), format!("Bearer {token}")));
        }

        ApiRequest {
            method: self.method.clone(),
            endpoint: self.endpoint.clone(),
            body: self.body.clone(),
            headers,
        }
    }
}

/// Raw response as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| AuthError::MalformedResponse(e.to_string()))
    }

    fn error_message(&self) -> String {
        match StatusCode::from_u16(self.status) {
            Ok(status) => error_message(status, &self.body),
            Err(_) => format!("API error: {}", self.status),
        }
    }
}

/// Sends a fully prepared request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse>;
}

/// `Transport` over reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    http_client: Client,
    api_url: Url,
}

impl HttpTransport {
    pub fn new(api_url: Url, timeout: Duration) -> AuthResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_url,
        })
    }

    pub fn with_client(http_client: Client, api_url: Url) -> Self {
        Self {
            http_client,
            api_url,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> AuthResult<ApiResponse> {
        let url = endpoint_url(&self.api_url, &request.endpoint)?;
        let mut builder = self.http_client.request(request.method.clone(), url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ApiResponse { status, body })
    }
}

/// API client bound to a session.
#[derive(Clone)]
pub struct SessionClient {
    session: SessionManager,
    transport: Arc<dyn Transport>,
}

impl SessionClient {
    pub fn new(session: SessionManager, transport: Arc<dyn Transport>) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Issue a request with the default retry budget.
    pub async fn request(&self, request: ApiRequest) -> AuthResult<ApiResponse> {
        self.request_with_budget(request, MAX_AUTH_RETRIES).await
    }

    /// Issue a request, retrying after a 401 at most `retries` times.
    pub async fn request_with_budget(
        &self,
        request: ApiRequest,
        mut retries: u32,
    ) -> AuthResult<ApiResponse> {
        let request_id = Uuid::new_v4();

        loop {
            let generation = self.session.generation();
            let bearer = self.session.access_token();
            let prepared = request.prepared(bearer.as_deref());

            debug!(
                request_id = %request_id,
                method = %request.method,
                endpoint = %request.endpoint,
                authenticated = bearer.is_some(),
                "Sending API request"
            );
            let response = self.transport.send(&prepared).await?;

            if response.status != StatusCode::UNAUTHORIZED.as_u16() {
                if response.is_success() {
                    return Ok(response);
                }
                let message = response.error_message();
                warn!(
                    request_id = %request_id,
                    status = response.status,
                    body = %summarize_response_body(&response.body),
                    "API request failed"
                );
                return Err(AuthError::Api {
                    status: response.status,
                    message,
                });
            }

            if retries == 0 {
                warn!(request_id = %request_id, "Still unauthorized after token refresh");
                return Err(AuthError::Api {
                    status: response.status,
                    message: response.error_message(),
                });
            }
            retries -= 1;

            if self.session.generation() != generation {
                debug!(request_id = %request_id, "Session changed while request was in flight");
                return Err(AuthError::SessionExpired);
            }

            // Another caller may have refreshed already
            if bearer.is_some() && self.session.access_token() != bearer {
                debug!(request_id = %request_id, "Token already refreshed, retrying");
                continue;
            }

            let outcome = self.session.refresh().await;
            if !outcome.is_success() {
                warn!(request_id = %request_id, outcome = ?outcome, "Refresh after 401 failed");
                return Err(AuthError::SessionExpired);
            }
            debug!(request_id = %request_id, "Retrying with refreshed token");
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> AuthResult<T> {
        self.request(ApiRequest::get(endpoint)).await?.json()
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AuthResult<T> {
        let body = serde_json::to_value(body)?;
        self.request(ApiRequest::post(endpoint, body)).await?.json()
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AuthResult<T> {
        let body = serde_json::to_value(body)?;
        self.request(ApiRequest::put(endpoint, body)).await?.json()
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, endpoint: &str) -> AuthResult<T> {
        self.request(ApiRequest::delete(endpoint)).await?.json()
    }
}
