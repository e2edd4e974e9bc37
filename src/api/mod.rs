pub mod auth;
pub mod client;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
///
/// Cloneable so that a single refresh failure can be handed to every request
/// that was parked behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    RequestError(String),
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("No refresh token available")]
    NoRefreshToken,
    #[error("Timed out waiting for token refresh")]
    RefreshTimeout,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Token pair returned by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
}

/// An outgoing API call, cloneable so it can be replayed after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::RequestError(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    /// Method, body and every other header are kept as-is.
    pub fn with_bearer(&self, token: &str) -> Result<Self, ApiError> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::RequestError("Access token is not a valid header value".to_string()))?;
        let mut cloned = self.clone();
        cloned.headers.insert(AUTHORIZATION, value);
        Ok(cloned)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }

    /// URL without query string or fragment.
    pub fn path(&self) -> &str {
        self.url.split(['?', '#']).next().unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

/// Something that can put an `ApiRequest` on the wire.
///
/// A 401 must come back as `ApiError::Unauthorized` and any other non-2xx
/// status as `ApiError::Status`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Refresh/logout collaborator used by the interceptor.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchanges the stored refresh token for a new pair. Does not store it.
    async fn refresh_token(&self) -> Result<RefreshResponse, ApiError>;
    /// Ends the session: clears tokens and sends the user to the login screen.
    async fn logout(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;

    #[test]
    fn with_bearer_only_touches_authorization() {
        let request = ApiRequest::post("https://api.example/api/protected?page=2")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_json(&serde_json::json!({ "value": 1 }))
            .unwrap();

        let authed = request.with_bearer("NEW").unwrap();

        assert_eq!(authed.method, Method::POST);
        assert_eq!(authed.url, request.url);
        assert_eq!(authed.body, request.body);
        assert_eq!(authed.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(authed.bearer_token(), Some("NEW"));
        assert_eq!(request.bearer_token(), None);
    }

    #[test]
    fn with_bearer_replaces_existing_token() {
        let request = ApiRequest::get("/api/data").with_bearer("OLD").unwrap();
        let replaced = request.with_bearer("NEW").unwrap();
        assert_eq!(replaced.headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(replaced.bearer_token(), Some("NEW"));
    }

    #[test]
    fn invalid_token_is_rejected() {
        let request = ApiRequest::get("/api/data");
        assert!(request.with_bearer("bad\ntoken").is_err());
    }

    #[test]
    fn path_strips_query_and_fragment() {
        assert_eq!(ApiRequest::get("/api/login?next=/home").path(), "/api/login");
        assert_eq!(ApiRequest::get("/api/a#frag").path(), "/api/a");
        assert_eq!(ApiRequest::get("/api/a").path(), "/api/a");
    }

    #[test]
    fn refresh_response_wire_shape() {
        let parsed: RefreshResponse =
            serde_json::from_str(r#"{"token":"NEW","refresh_token":"R2"}"#).unwrap();
        assert_eq!(parsed.token, "NEW");
        assert_eq!(parsed.refresh_token, "R2");
    }
}
