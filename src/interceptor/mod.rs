//! Bearer-token interceptor with transparent refresh-and-retry.

pub mod refresh;

pub use refresh::{RefreshCoordinator, RefreshState};

use crate::api::{ApiError, ApiRequest, ApiResponse, Authenticator, HttpTransport};
use crate::session::TokenStore;
use async_trait::async_trait;
use refresh::RefreshLease;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Endpoints that never carry credentials and never trigger a refresh.
pub const BYPASS_PATHS: [&str; 3] = ["/login", "/register", "/token/refresh"];

pub fn is_bypassed(request: &ApiRequest) -> bool {
    let path = request.path();
    BYPASS_PATHS.iter().any(|suffix| path.ends_with(suffix))
}

pub struct AuthInterceptor {
    tokens: Arc<TokenStore>,
    authenticator: Arc<dyn Authenticator>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthInterceptor {
    pub fn new(
        tokens: Arc<TokenStore>,
        authenticator: Arc<dyn Authenticator>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            tokens,
            authenticator,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Runs `request` through `next`, attaching the access token and
    /// recovering from a 401 with a single shared refresh.
    pub async fn intercept(
        &self,
        request: ApiRequest,
        next: &dyn HttpTransport,
    ) -> Result<ApiResponse, ApiError> {
        if is_bypassed(&request) {
            return next.send(request).await;
        }

        let sent_token = self.tokens.get_access_token();
        let outgoing = match &sent_token {
            Some(token) => request.with_bearer(token)?,
            None => request.clone(),
        };

        match next.send(outgoing).await {
            Err(ApiError::Unauthorized) => self.recover(request, sent_token, next).await,
            other => other,
        }
    }

    async fn recover(
        &self,
        request: ApiRequest,
        sent_token: Option<String>,
        next: &dyn HttpTransport,
    ) -> Result<ApiResponse, ApiError> {
        // The refresh for this very token already failed and ended the session.
        if let Some(error) = self.coordinator.failure_for(sent_token.as_deref()) {
            log::debug!("Session already ended, failing {} {}", request.method, request.url);
            return Err(error);
        }

        if !self.coordinator.begin_refresh() {
            log::debug!("Refresh in flight, parking {} {}", request.method, request.url);
            let token = self.coordinator.await_token().await?;
            return next.send(request.with_bearer(&token)?).await;
        }

        let lease = RefreshLease::new(&self.coordinator, sent_token.clone());

        // A refresh (or login) already replaced the token this request went out with.
        if let Some(current) = self
            .tokens
            .get_access_token()
            .filter(|current| Some(current) != sent_token.as_ref())
        {
            lease.complete(current.clone());
            return next.send(request.with_bearer(&current)?).await;
        }

        log::info!("Access token rejected, refreshing");
        match self.authenticator.refresh_token().await {
            Ok(pair) => {
                if let Err(e) = self.tokens.set_tokens(&pair.token, &pair.refresh_token) {
                    log::warn!("Failed to persist refreshed tokens: {}", e);
                }
                lease.complete(pair.token.clone());
                next.send(request.with_bearer(&pair.token)?).await
            }
            Err(error) => {
                log::warn!("Token refresh failed, ending session: {}", error);
                lease.fail(error.clone());
                self.authenticator.logout().await;
                Err(error)
            }
        }
    }
}

/// API client whose every call passes through the `AuthInterceptor`.
pub struct AuthenticatedClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    interceptor: AuthInterceptor,
}

impl AuthenticatedClient {
    pub fn new(base_url: &str, transport: Arc<dyn HttpTransport>, interceptor: AuthInterceptor) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            interceptor,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(self.url(path))).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        self.post(path, body).await?.json()
    }

    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError>
    where
        B: Serialize + Sync,
    {
        let request = ApiRequest::post(self.url(path)).with_json(body)?;
        self.send(request).await
    }
}

#[async_trait]
impl HttpTransport for AuthenticatedClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.interceptor.intercept(request, self.transport.as_ref()).await
    }
}
