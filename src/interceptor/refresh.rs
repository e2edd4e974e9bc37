//! Single-flight refresh coordination.
//!
//! One `RefreshCoordinator` exists per application. The first request that
//! hits a 401 claims the refresh with `begin_refresh`; every other request
//! that fails while it is in flight parks on `await_token` and is released
//! with the same outcome.

use crate::api::ApiError;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh in flight. `token` is the last token a refresh produced.
    Idle { token: Option<String> },
    Refreshing,
    /// The last refresh failed; waiters receive `error`. `rejected_token` is
    /// the access token whose refresh failed, when that failure ended the session.
    Failed {
        error: ApiError,
        rejected_token: Option<String>,
    },
}

pub struct RefreshCoordinator {
    state: watch::Sender<RefreshState>,
    wait_timeout: Option<Duration>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::with_wait_timeout(None)
    }

    pub fn with_wait_timeout(wait_timeout: Option<Duration>) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle { token: None });
        Self { state, wait_timeout }
    }

    /// Claims the refresh. Returns `false` when one is already in flight.
    pub fn begin_refresh(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, RefreshState::Refreshing) {
                false
            } else {
                *state = RefreshState::Refreshing;
                true
            }
        })
    }

    pub fn complete_refresh(&self, token: String) {
        self.state.send_replace(RefreshState::Idle { token: Some(token) });
    }

    pub fn fail_refresh(&self, error: ApiError) {
        self.fail_refresh_for(error, None);
    }

    /// Fails the refresh that was started because `rejected_token` got a 401.
    pub fn fail_refresh_for(&self, error: ApiError, rejected_token: Option<String>) {
        self.state.send_replace(RefreshState::Failed {
            error,
            rejected_token,
        });
    }

    /// The error of the last failed refresh, if it was for `sent_token`.
    /// A request that went out with that token has nothing left to refresh.
    pub fn failure_for(&self, sent_token: Option<&str>) -> Option<ApiError> {
        match &*self.state.borrow() {
            RefreshState::Failed {
                error,
                rejected_token: Some(rejected),
            } if Some(rejected.as_str()) == sent_token => Some(error.clone()),
            _ => None,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.borrow(), RefreshState::Refreshing)
    }

    pub fn latest_token(&self) -> Option<String> {
        match &*self.state.borrow() {
            RefreshState::Idle { token } => token.clone(),
            _ => None,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.state.borrow().clone()
    }

    /// Waits for the in-flight refresh to settle and yields its token.
    ///
    /// Returns immediately when no refresh is in flight.
    pub async fn await_token(&self) -> Result<String, ApiError> {
        let mut rx = self.state.subscribe();
        let settled = async move {
            let state = rx
                .wait_for(|state| !matches!(state, RefreshState::Refreshing))
                .await
                .map_err(|_| ApiError::RequestError("Refresh coordinator shut down".to_string()))?;

            match &*state {
                RefreshState::Idle { token: Some(token) } => Ok(token.clone()),
                RefreshState::Failed { error, .. } => Err(error.clone()),
                RefreshState::Idle { token: None } | RefreshState::Refreshing => {
                    Err(ApiError::Unauthorized)
                }
            }
        };

        match self.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, settled)
                .await
                .map_err(|_| ApiError::RefreshTimeout)?,
            None => settled.await,
        }
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Settles a claimed refresh as failed if the leader is dropped mid-flight,
/// so parked requests are not stranded.
pub(crate) struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    rejected_token: Option<String>,
    settled: bool,
}

impl<'a> RefreshLease<'a> {
    pub(crate) fn new(coordinator: &'a RefreshCoordinator, rejected_token: Option<String>) -> Self {
        Self {
            coordinator,
            rejected_token,
            settled: false,
        }
    }

    pub(crate) fn complete(mut self, token: String) {
        self.settled = true;
        self.coordinator.complete_refresh(token);
    }

    pub(crate) fn fail(mut self, error: ApiError) {
        self.settled = true;
        self.coordinator
            .fail_refresh_for(error, self.rejected_token.take());
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Token refresh abandoned before it settled");
            self.coordinator
                .fail_refresh(ApiError::RequestError("Token refresh was cancelled".to_string()));
        }
    }
}
