//! Push delivery: the detached worker that renders notifications and relays
//! clicked actions to application windows, plus the foreground pieces that
//! sit around it (inbox, subscription management).

pub mod host;
pub mod inbox;
pub mod platform;
pub mod protocol;
pub mod subscription;
pub mod worker;

use async_trait::async_trait;
use protocol::{Notification, RelayMessage};
use thiserror::Error;

pub type ClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// An open application window as seen from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: ClientId,
    pub url: String,
    pub visibility: Visibility,
    /// Whether the window can be navigated in place.
    pub can_navigate: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Notification display failed: {0}")]
    Display(String),
    #[error("Window {0} is no longer open")]
    ClientGone(ClientId),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Opening windows is not supported")]
    OpenWindowUnsupported,
    #[error("Message delivery failed: {0}")]
    Delivery(String),
}

/// Host services available to the push worker.
#[async_trait]
pub trait WorkerPlatform: Send + Sync {
    async fn show_notification(&self, notification: &Notification) -> Result<(), PlatformError>;
    fn close_notification(&self, notification: &Notification);
    /// All open windows, including ones this worker does not control when
    /// `include_uncontrolled` is set.
    async fn match_all_windows(&self, include_uncontrolled: bool) -> Vec<WindowClient>;
    fn supports_open_window(&self) -> bool;
    /// Opens a window at `url`. `Ok(None)` when the platform declined.
    async fn open_window(&self, url: &str) -> Result<Option<WindowClient>, PlatformError>;
    async fn navigate(&self, client: ClientId, url: &str) -> Result<(), PlatformError>;
    fn post_message(&self, client: ClientId, message: &RelayMessage) -> Result<(), PlatformError>;
    async fn focus(&self, client: ClientId) -> Result<(), PlatformError>;
}
