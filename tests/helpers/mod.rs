#![allow(dead_code)]

use async_trait::async_trait;
use ecotrack_client::api::{ApiError, ApiRequest, ApiResponse, HttpTransport};
use ecotrack_client::bridge::{Reloader, Router};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory stand-in for the REST backend.
///
/// Accepts only `Bearer <valid token>` on protected routes. The refresh
/// endpoint waits `refresh_delay`, then either rotates the valid token or
/// answers 401 when no rotation is configured.
pub struct FakeBackend {
    valid_token: Mutex<String>,
    next_pair: Mutex<Option<(String, String)>>,
    refresh_delay: Duration,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeBackend {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            next_pair: Mutex::new(None),
            refresh_delay: Duration::from_millis(20),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn rotating_to(self, token: &str, refresh_token: &str) -> Self {
        *self.next_pair.lock().unwrap() = Some((token.to_string(), refresh_token.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().iter().map(|r| r.path().to_string()).collect()
    }

    pub fn count(&self, suffix: &str) -> usize {
        self.paths().iter().filter(|p| p.ends_with(suffix)).count()
    }

    fn ok(body: Value) -> ApiResponse {
        ApiResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        let path = request.path().to_string();

        if path.ends_with("/token/refresh") {
            tokio::time::sleep(self.refresh_delay).await;
            let pair = self.next_pair.lock().unwrap().clone();
            return match pair {
                Some((token, refresh_token)) => {
                    *self.valid_token.lock().unwrap() = token.clone();
                    Ok(Self::ok(json!({"token": token, "refresh_token": refresh_token})))
                }
                None => Err(ApiError::Unauthorized),
            };
        }

        let valid = self.valid_token.lock().unwrap().clone();
        if path.ends_with("/login") {
            return Ok(Self::ok(json!({"token": valid, "refresh_token": "R1"})));
        }
        if request.bearer_token() != Some(valid.as_str()) {
            return Err(ApiError::Unauthorized);
        }
        if path.ends_with("/reminders") {
            return Ok(Self::ok(json!({"id": 42})));
        }
        Ok(Self::ok(json!({})))
    }
}

#[derive(Default)]
pub struct RecordingRouter {
    urls: Mutex<Vec<String>>,
}

impl RecordingRouter {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Router for RecordingRouter {
    async fn navigate_by_url(&self, url: &str) {
        self.urls.lock().unwrap().push(url.to_string());
    }
}

#[derive(Default)]
pub struct CountingReloader {
    reloads: AtomicUsize,
}

impl CountingReloader {
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Reloader for CountingReloader {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

pub async fn wait_until(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}
