use super::{ApiError, ApiRequest, Authenticator, HttpTransport, RefreshResponse};
use crate::bridge::Router;
use crate::session::TokenStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Login, token refresh and logout against the REST backend.
///
/// Talks to the raw transport: every endpoint used here is on the
/// interceptor's bypass list anyway.
pub struct AuthService {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenStore>,
    router: Arc<dyn Router>,
}

impl AuthService {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenStore>,
        router: Arc<dyn Router>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            tokens,
            router,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post(format!("{}/api/login", self.base_url))
            .with_json(&LoginRequest { username, password })?;

        let pair: RefreshResponse = self.transport.send(request).await?.json()?;

        if let Err(e) = self.tokens.set_tokens(&pair.token, &pair.refresh_token) {
            log::warn!("Logged in but failed to persist tokens: {}", e);
        }
        log::info!("Logged in as {}", username);
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.tokens.is_authenticated()
    }
}

#[async_trait]
impl Authenticator for AuthService {
    async fn refresh_token(&self) -> Result<RefreshResponse, ApiError> {
        let refresh_token = self
            .tokens
            .get_refresh_token()
            .ok_or(ApiError::NoRefreshToken)?;

        let request = ApiRequest::post(format!("{}/api/token/refresh", self.base_url))
            .with_json(&RefreshRequest {
                refresh_token: &refresh_token,
            })?;

        self.transport.send(request).await?.json()
    }

    async fn logout(&self) {
        if let Err(e) = self.tokens.clear_tokens() {
            log::warn!("Failed to clear stored tokens: {}", e);
        }
        log::info!("Session ended, redirecting to {}", LOGIN_ROUTE);
        self.router.navigate_by_url(LOGIN_ROUTE).await;
    }
}
