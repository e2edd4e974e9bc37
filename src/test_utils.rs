//! Fakes shared by the unit tests.

use crate::api::{ApiError, ApiRequest, ApiResponse, Authenticator, HttpTransport, RefreshResponse};
use crate::bridge::{Reloader, Router};
use crate::reminders::ReminderActions;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// Transport answering from a closure and recording every request it saw.
pub struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn json_ok(body: &str) -> ApiResponse {
        ApiResponse {
            status: 200,
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let result = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

/// Authenticator with a fixed refresh outcome and an optional gate that
/// holds refreshes until `open_gate` is called.
pub struct FakeAuthenticator {
    outcome: Result<RefreshResponse, ApiError>,
    gate: watch::Sender<bool>,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn new(outcome: Result<RefreshResponse, ApiError>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            outcome,
            gate,
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(outcome: Result<RefreshResponse, ApiError>) -> Self {
        let auth = Self::new(outcome);
        auth.gate.send_replace(false);
        auth
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn refresh_token(&self) -> Result<RefreshResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.outcome.clone()
    }

    async fn logout(&self) {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
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
pub struct RecordingReloader {
    reloads: AtomicUsize,
}

impl RecordingReloader {
    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl Reloader for RecordingReloader {
    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingReminders {
    completed: Mutex<Vec<u64>>,
    snoozed: Mutex<Vec<u64>>,
    fail_with: Option<ApiError>,
}

impl RecordingReminders {
    pub fn failing(error: ApiError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    pub fn completed(&self) -> Vec<u64> {
        self.completed.lock().unwrap().clone()
    }

    pub fn snoozed(&self) -> Vec<u64> {
        self.snoozed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReminderActions for RecordingReminders {
    async fn complete(&self, id: u64) -> Result<(), ApiError> {
        self.completed.lock().unwrap().push(id);
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn snooze(&self, id: u64) -> Result<(), ApiError> {
        self.snoozed.lock().unwrap().push(id);
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Yields until `condition` holds; panics after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 5s");
}
