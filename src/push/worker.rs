//! Background push worker.
//!
//! Two entry points mirror the platform events it handles: a push message
//! arriving and a notification being clicked. Neither returns an error: every
//! failure is logged here so the hosting event loop never sees one.

use super::protocol::{
    default_actions, Notification, NotificationOptions, PushAction, PushPayload, RelayMessage,
    DEFAULT_TITLE,
};
use super::{ClientId, PlatformError, Visibility, WindowClient, WorkerPlatform};
use crate::settings::PushSettings;
use reqwest::Url;
use std::sync::Arc;

/// A click on a displayed notification. `action` is `None` when the body
/// (rather than a button) was clicked.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationClick {
    pub action: Option<String>,
    pub notification: Notification,
}

/// Where a clicked action ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    ExistingWindow(ClientId),
    NewWindow(ClientId),
    Undelivered,
}

pub struct PushWorker {
    platform: Arc<dyn WorkerPlatform>,
    settings: PushSettings,
    base_url: String,
}

impl PushWorker {
    pub fn new(platform: Arc<dyn WorkerPlatform>, settings: PushSettings) -> Self {
        let base_url = settings.frontend_base_url.trim_end_matches('/').to_string();
        Self {
            platform,
            settings,
            base_url,
        }
    }

    /// Builds the notification for a raw push body.
    ///
    /// Bodies that are not a JSON object become a plain-text notification.
    pub fn build_notification(&self, raw: Option<&[u8]>) -> Notification {
        let payload = match raw {
            None => PushPayload::default(),
            Some(bytes) => serde_json::from_slice::<PushPayload>(bytes).unwrap_or_else(|e| {
                log::warn!("[push] payload is not JSON ({}), falling back to text", e);
                PushPayload {
                    title: Some(DEFAULT_TITLE.to_string()),
                    body: Some(String::from_utf8_lossy(bytes).into_owned()),
                    ..PushPayload::default()
                }
            }),
        };

        Notification {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            options: NotificationOptions {
                body: payload.body.unwrap_or_default(),
                icon: payload.icon.unwrap_or_else(|| self.settings.default_icon.clone()),
                badge: payload.badge.unwrap_or_else(|| self.settings.default_badge.clone()),
                data: payload.data.unwrap_or_default(),
                actions: payload.actions.unwrap_or_else(default_actions),
                tag: payload.tag.unwrap_or_else(|| self.settings.default_tag.clone()),
            },
        }
    }

    /// Renders a push message as an OS notification.
    pub async fn handle_push(&self, raw: Option<&[u8]>) -> Notification {
        let notification = self.build_notification(raw);
        log::debug!("[push] displaying '{}' (tag {})", notification.title, notification.options.tag);

        if let Err(e) = self.platform.show_notification(&notification).await {
            log::error!("[push] showNotification failed: {}", e);
        }
        notification
    }

    /// Closes the notification and relays the chosen action to a window,
    /// opening one when none is available.
    pub async fn handle_notification_click(&self, click: NotificationClick) -> Delivery {
        self.platform.close_notification(&click.notification);

        let action = PushAction::resolve(click.action.as_deref());
        let data = &click.notification.options.data;
        let target_url = resolve_target_url(&self.base_url, data.url.as_deref());
        let message = RelayMessage::ReminderAction {
            action,
            reminder_id: data.reminder_id,
            url: Some(target_url.clone()),
        };

        match self.relay(action, &target_url, &message).await {
            Ok(delivery) => {
                log::info!("[push] '{}' relayed: {:?}", action, delivery);
                delivery
            }
            Err(e) => {
                log::error!("[push] failed to relay '{}': {}", action, e);
                Delivery::Undelivered
            }
        }
    }

    async fn relay(
        &self,
        action: PushAction,
        target_url: &str,
        message: &RelayMessage,
    ) -> Result<Delivery, PlatformError> {
        let windows = self.platform.match_all_windows(true).await;

        let Some(target) = select_window(&windows, target_url) else {
            return self.open_and_post(target_url, message).await;
        };

        if !same_url(&target.url, target_url) && action.navigates() {
            if target.can_navigate {
                if let Err(e) = self.platform.navigate(target.id, target_url).await {
                    log::warn!("[push] in-place navigation failed: {}", e);
                }
            } else if self.platform.supports_open_window() {
                return self.open_and_post(target_url, message).await;
            }
        }

        self.platform.post_message(target.id, message)?;
        self.focus(target.id).await;
        Ok(Delivery::ExistingWindow(target.id))
    }

    async fn open_and_post(
        &self,
        target_url: &str,
        message: &RelayMessage,
    ) -> Result<Delivery, PlatformError> {
        if !self.platform.supports_open_window() {
            log::warn!("[push] no window to deliver to and cannot open one");
            return Ok(Delivery::Undelivered);
        }

        match self.platform.open_window(target_url).await? {
            Some(opened) => {
                self.platform.post_message(opened.id, message)?;
                self.focus(opened.id).await;
                Ok(Delivery::NewWindow(opened.id))
            }
            None => Ok(Delivery::Undelivered),
        }
    }

    async fn focus(&self, client: ClientId) {
        if let Err(e) = self.platform.focus(client).await {
            log::warn!("[push] could not focus window {}: {}", client, e);
        }
    }
}

/// Resolves `path` against the frontend origin, falling back to the origin root.
pub fn resolve_target_url(base_url: &str, path: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.filter(|p| !p.is_empty()).unwrap_or("/");

    Url::parse(base)
        .and_then(|base| base.join(path))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| format!("{}/", base))
}

fn normalize(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| u.to_string())
}

fn same_url(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Exact URL match first, then a visible window, then any window.
pub fn select_window<'a>(windows: &'a [WindowClient], target_url: &str) -> Option<&'a WindowClient> {
    windows
        .iter()
        .find(|w| same_url(&w.url, target_url))
        .or_else(|| windows.iter().find(|w| w.visibility == Visibility::Visible))
        .or_else(|| windows.first())
}
