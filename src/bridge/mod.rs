//! Application side of the push relay: turns `REMINDER_ACTION` messages
//! posted by the worker into reminder calls, navigation and reloads.

use crate::api::ApiError;
use crate::push::protocol::{PushAction, RelayMessage, REMINDER_ACTION};
use crate::reminders::ReminderActions;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// In-app navigation.
#[async_trait]
pub trait Router: Send + Sync {
    async fn navigate_by_url(&self, url: &str);
}

/// Full reload of the running application.
pub trait Reloader: Send + Sync {
    fn reload(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// Not a reminder action, or unreadable.
    Ignored,
    Handled,
    /// A reminder call failed; later steps of the message were skipped.
    Failed(ApiError),
}

pub struct PushBridge {
    reminders: Arc<dyn ReminderActions>,
    router: Arc<dyn Router>,
    reloader: Arc<dyn Reloader>,
}

impl PushBridge {
    pub fn new(
        reminders: Arc<dyn ReminderActions>,
        router: Arc<dyn Router>,
        reloader: Arc<dyn Reloader>,
    ) -> Self {
        Self {
            reminders,
            router,
            reloader,
        }
    }

    /// Listens on the window's message channel until it closes.
    /// Without a channel (push unavailable) nothing is registered.
    pub fn attach(self: Arc<Self>, channel: Option<mpsc::UnboundedReceiver<Value>>) -> Option<JoinHandle<()>> {
        match channel {
            Some(rx) => Some(tokio::spawn(self.listen(rx))),
            None => {
                log::debug!("[bridge] no push channel, relay disabled");
                None
            }
        }
    }

    /// Handles messages in arrival order until every sender is gone.
    pub async fn listen(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(message) = rx.recv().await {
            self.handle_message(&message).await;
        }
        log::debug!("[bridge] push channel closed");
    }

    pub async fn handle_message(&self, message: &Value) -> BridgeOutcome {
        if message.get("type").and_then(Value::as_str) != Some(REMINDER_ACTION) {
            return BridgeOutcome::Ignored;
        }

        let RelayMessage::ReminderAction {
            action,
            reminder_id,
            url,
        } = match serde_json::from_value::<RelayMessage>(message.clone()) {
            Ok(parsed) => parsed,
            Err(e) => return self.navigate_only(message, e).await,
        };

        match self.apply(action, reminder_id, url.as_deref()).await {
            Ok(()) => BridgeOutcome::Handled,
            Err(e) => {
                log::error!("Push action failed: {}", e);
                BridgeOutcome::Failed(e)
            }
        }
    }

    /// A reminder action this client does not understand still carries
    /// somewhere to go.
    async fn navigate_only(&self, message: &Value, error: serde_json::Error) -> BridgeOutcome {
        match message.get("url").and_then(Value::as_str).filter(|u| !u.is_empty()) {
            Some(url) => {
                log::warn!("[bridge] unreadable reminder action ({}), only navigating", error);
                self.router.navigate_by_url(url).await;
                BridgeOutcome::Handled
            }
            None => {
                log::warn!("[bridge] unreadable reminder action: {}", error);
                BridgeOutcome::Ignored
            }
        }
    }

    async fn apply(&self, action: PushAction, reminder_id: Option<u64>, url: Option<&str>) -> Result<(), ApiError> {
        match (action, reminder_id) {
            (PushAction::Done, Some(id)) => self.reminders.complete(id).await?,
            (PushAction::Snooze, Some(id)) => self.reminders.snooze(id).await?,
            _ => {}
        }

        if let Some(url) = url.filter(|u| !u.is_empty()) {
            self.router.navigate_by_url(url).await;
        }

        if action == PushAction::Reload {
            self.reloader.reload();
        }
        Ok(())
    }
}
