//! In-process window registry implementing `WorkerPlatform`.
//!
//! Each registered window owns an unbounded channel; posting a relay message
//! serializes it to JSON and drops it on that channel, where the window's
//! `PushBridge` picks it up. Windows opened by the worker are announced on the
//! launch channel returned by `LocalWindows::new` so the host can attach a
//! bridge to them.

use super::protocol::{Notification, RelayMessage};
use super::{ClientId, PlatformError, Visibility, WindowClient, WorkerPlatform};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub type WindowInbox = mpsc::UnboundedReceiver<Value>;

/// A window the worker opened, handed to whoever runs the application side.
pub struct LaunchedWindow {
    pub client: WindowClient,
    pub messages: WindowInbox,
}

struct WindowEntry {
    client: WindowClient,
    controlled: bool,
    sender: mpsc::UnboundedSender<Value>,
}

pub struct LocalWindows {
    windows: Mutex<Vec<WindowEntry>>,
    tray: Mutex<Vec<Notification>>,
    next_id: AtomicU64,
    launcher: mpsc::UnboundedSender<LaunchedWindow>,
    allow_open: bool,
    display_delay: Option<Duration>,
}

impl LocalWindows {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LaunchedWindow>) {
        let (launcher, launched) = mpsc::unbounded_channel();
        let windows = Self {
            windows: Mutex::new(Vec::new()),
            tray: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            launcher,
            allow_open: true,
            display_delay: None,
        };
        (windows, launched)
    }

    pub fn without_open_window(mut self) -> Self {
        self.allow_open = false;
        self
    }

    /// Simulates a slow notification service.
    pub fn with_display_delay(mut self, delay: Duration) -> Self {
        self.display_delay = Some(delay);
        self
    }

    /// Registers a window opened by the application itself.
    pub fn register(&self, url: &str, visibility: Visibility, controlled: bool) -> (WindowClient, WindowInbox) {
        self.insert(url, visibility, controlled, true)
    }

    /// Registers a window that cannot be navigated in place.
    pub fn register_fixed(&self, url: &str, visibility: Visibility) -> (WindowClient, WindowInbox) {
        self.insert(url, visibility, true, false)
    }

    pub fn close(&self, client: ClientId) {
        self.lock_windows().retain(|w| w.client.id != client);
    }

    /// Closes every window. Each window's channel ends once its pending
    /// messages are read.
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.lock_windows());
        log::debug!("[windows] closed {} window(s)", closed.len());
    }

    pub fn set_visibility(&self, client: ClientId, visibility: Visibility) {
        if let Some(entry) = self.lock_windows().iter_mut().find(|w| w.client.id == client) {
            entry.client.visibility = visibility;
        }
    }

    pub fn window(&self, client: ClientId) -> Option<WindowClient> {
        self.lock_windows()
            .iter()
            .find(|w| w.client.id == client)
            .map(|w| w.client.clone())
    }

    /// Notifications currently displayed.
    pub fn notifications(&self) -> Vec<Notification> {
        match self.tray.lock() {
            Ok(tray) => tray.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn insert(
        &self,
        url: &str,
        visibility: Visibility,
        controlled: bool,
        can_navigate: bool,
    ) -> (WindowClient, WindowInbox) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let client = WindowClient {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            url: url.to_string(),
            visibility,
            can_navigate,
        };
        self.lock_windows().push(WindowEntry {
            client: client.clone(),
            controlled,
            sender,
        });
        (client, inbox)
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, Vec<WindowEntry>> {
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_tray(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        match self.tray.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl WorkerPlatform for LocalWindows {
    async fn show_notification(&self, notification: &Notification) -> Result<(), PlatformError> {
        if let Some(delay) = self.display_delay {
            tokio::time::sleep(delay).await;
        }

        let mut tray = self.lock_tray();
        // same tag replaces the previous notification
        tray.retain(|n| n.options.tag != notification.options.tag);
        tray.push(notification.clone());

        log::info!("[notification] {}: {}", notification.title, notification.options.body);
        Ok(())
    }

    fn close_notification(&self, notification: &Notification) {
        self.lock_tray()
            .retain(|n| n.options.tag != notification.options.tag);
    }

    async fn match_all_windows(&self, include_uncontrolled: bool) -> Vec<WindowClient> {
        self.lock_windows()
            .iter()
            .filter(|w| include_uncontrolled || w.controlled)
            .map(|w| w.client.clone())
            .collect()
    }

    fn supports_open_window(&self) -> bool {
        self.allow_open
    }

    async fn open_window(&self, url: &str) -> Result<Option<WindowClient>, PlatformError> {
        if !self.allow_open {
            return Err(PlatformError::OpenWindowUnsupported);
        }

        let (client, messages) = self.insert(url, Visibility::Visible, true, true);
        let launched = LaunchedWindow {
            client: client.clone(),
            messages,
        };

        if self.launcher.send(launched).is_err() {
            // nobody is around to run the application side
            self.close(client.id);
            return Ok(None);
        }
        Ok(Some(client))
    }

    async fn navigate(&self, client: ClientId, url: &str) -> Result<(), PlatformError> {
        let mut windows = self.lock_windows();
        let entry = windows
            .iter_mut()
            .find(|w| w.client.id == client)
            .ok_or(PlatformError::ClientGone(client))?;

        if !entry.client.can_navigate {
            return Err(PlatformError::Navigation(format!("window {} cannot navigate", client)));
        }
        entry.client.url = url.to_string();
        Ok(())
    }

    fn post_message(&self, client: ClientId, message: &RelayMessage) -> Result<(), PlatformError> {
        let value =
            serde_json::to_value(message).map_err(|e| PlatformError::Delivery(e.to_string()))?;

        let mut windows = self.lock_windows();
        let entry = windows
            .iter()
            .position(|w| w.client.id == client)
            .ok_or(PlatformError::ClientGone(client))?;

        if windows[entry].sender.send(value).is_err() {
            windows.remove(entry);
            return Err(PlatformError::ClientGone(client));
        }
        Ok(())
    }

    async fn focus(&self, client: ClientId) -> Result<(), PlatformError> {
        let mut windows = self.lock_windows();
        if !windows.iter().any(|w| w.client.id == client) {
            return Err(PlatformError::ClientGone(client));
        }
        for entry in windows.iter_mut() {
            entry.client.visibility = if entry.client.id == client {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::protocol::{NotificationData, NotificationOptions, PushAction};

    fn message() -> RelayMessage {
        RelayMessage::ReminderAction {
            action: PushAction::Done,
            reminder_id: Some(7),
            url: Some("https://eco.example/".to_string()),
        }
    }

    #[tokio::test]
    async fn posted_messages_arrive_as_json() {
        let (windows, _launched) = LocalWindows::new();
        let (client, mut inbox) = windows.register("https://eco.example/", Visibility::Visible, true);

        windows.post_message(client.id, &message()).unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received["type"], "REMINDER_ACTION");
        assert_eq!(received["reminderId"], 7);
    }

    #[tokio::test]
    async fn closed_inbox_removes_window() {
        let (windows, _launched) = LocalWindows::new();
        let (client, inbox) = windows.register("https://eco.example/", Visibility::Visible, true);
        drop(inbox);

        assert_eq!(
            windows.post_message(client.id, &message()),
            Err(PlatformError::ClientGone(client.id))
        );
        assert!(windows.window(client.id).is_none());
    }

    #[tokio::test]
    async fn uncontrolled_windows_need_opt_in() {
        let (windows, _launched) = LocalWindows::new();
        windows.register("https://eco.example/a", Visibility::Hidden, false);
        windows.register("https://eco.example/b", Visibility::Hidden, true);

        assert_eq!(windows.match_all_windows(false).await.len(), 1);
        assert_eq!(windows.match_all_windows(true).await.len(), 2);
    }

    #[tokio::test]
    async fn opened_windows_are_announced() {
        let (windows, mut launched) = LocalWindows::new();

        let opened = windows.open_window("https://eco.example/x").await.unwrap().unwrap();

        let announced = launched.recv().await.unwrap();
        assert_eq!(announced.client, opened);
        assert_eq!(windows.window(opened.id).unwrap().visibility, Visibility::Visible);
    }

    #[tokio::test]
    async fn open_without_launcher_is_declined() {
        let (windows, launched) = LocalWindows::new();
        drop(launched);

        assert_eq!(windows.open_window("https://eco.example/").await, Ok(None));
        assert!(windows.match_all_windows(true).await.is_empty());
    }

    #[tokio::test]
    async fn focus_and_navigate_update_state() {
        let (windows, _launched) = LocalWindows::new();
        let (a, _ia) = windows.register("https://eco.example/a", Visibility::Visible, true);
        let (b, _ib) = windows.register_fixed("https://eco.example/b", Visibility::Hidden);

        windows.focus(b.id).await.unwrap();
        assert_eq!(windows.window(a.id).unwrap().visibility, Visibility::Hidden);
        assert_eq!(windows.window(b.id).unwrap().visibility, Visibility::Visible);

        windows.navigate(a.id, "https://eco.example/c").await.unwrap();
        assert_eq!(windows.window(a.id).unwrap().url, "https://eco.example/c");
        assert!(windows.navigate(b.id, "https://eco.example/c").await.is_err());
    }

    fn notification(title: &str, tag: &str) -> Notification {
        Notification {
            title: title.to_string(),
            options: NotificationOptions {
                body: String::new(),
                icon: "/icon.png".to_string(),
                badge: "/badge.png".to_string(),
                data: NotificationData::default(),
                actions: Vec::new(),
                tag: tag.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn close_all_ends_channels_after_pending_messages() {
        let (windows, _launched) = LocalWindows::new();
        let (client, mut inbox) = windows.register("https://eco.example/", Visibility::Visible, true);
        windows.post_message(client.id, &message()).unwrap();

        windows.close_all();

        assert!(inbox.recv().await.is_some());
        assert!(inbox.recv().await.is_none());
        assert!(windows.match_all_windows(true).await.is_empty());
    }

    #[tokio::test]
    async fn same_tag_replaces_and_close_removes() {
        let (windows, _launched) = LocalWindows::new();
        let first = notification("first", "default");
        let second = notification("second", "default");
        let other = notification("other", "weekly");

        windows.show_notification(&first).await.unwrap();
        windows.show_notification(&other).await.unwrap();
        windows.show_notification(&second).await.unwrap();
        assert_eq!(windows.notifications(), vec![other.clone(), second.clone()]);

        windows.close_notification(&second);
        assert_eq!(windows.notifications(), vec![other]);
    }
}
