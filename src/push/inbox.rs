//! Foreground record of received push messages, newest first.

use crate::storage::{KeyValueStore, StorageError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub const INBOX_KEY: &str = "app.notifications";
pub const INBOX_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    pub received_at: String,
}

impl InboxEntry {
    /// Reads a push message as delivered to the page: either
    /// `{ notification: { title, body, data } }` or a flat `{ title, body, data }`.
    pub fn from_message(message: &Value) -> Self {
        let source = message
            .get("notification")
            .filter(|n| n.is_object())
            .unwrap_or(message);

        let title = source
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(super::protocol::DEFAULT_TITLE)
            .to_string();

        Self {
            title,
            body: source.get("body").and_then(Value::as_str).map(str::to_string),
            data: source.get("data").filter(|d| !d.is_null()).cloned(),
            received_at: Utc::now().to_rfc3339(),
        }
    }
}

pub struct NotificationInbox {
    storage: Arc<dyn KeyValueStore>,
    entries: Mutex<Vec<InboxEntry>>,
}

impl NotificationInbox {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let entries = match storage.get(INBOX_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("Discarding unreadable notification inbox: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Failed to load notification inbox: {}", e);
                Vec::new()
            }
        };

        Self {
            storage,
            entries: Mutex::new(entries),
        }
    }

    /// Prepends a received message, keeping at most `INBOX_CAPACITY` entries.
    pub fn record(&self, message: &Value) -> Result<InboxEntry, StorageError> {
        let entry = InboxEntry::from_message(message);

        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(0, entry.clone());
        entries.truncate(INBOX_CAPACITY);

        let raw = serde_json::to_string(&*entries)?;
        self.storage.set(INBOX_KEY, &raw)?;
        Ok(entry)
    }

    pub fn entries(&self) -> Vec<InboxEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.entries.lock().map_err(|_| StorageError::Poisoned)?.clear();
        self.storage.remove(INBOX_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn nested_and_flat_messages() {
        let nested = InboxEntry::from_message(&json!({
            "notification": {"title": "Rappel", "body": "Arroser", "data": {"reminderId": 3}}
        }));
        assert_eq!(nested.title, "Rappel");
        assert_eq!(nested.body.as_deref(), Some("Arroser"));
        assert_eq!(nested.data, Some(json!({"reminderId": 3})));

        let flat = InboxEntry::from_message(&json!({"title": "Flat"}));
        assert_eq!(flat.title, "Flat");
        assert_eq!(flat.body, None);

        let untitled = InboxEntry::from_message(&json!({"body": "x"}));
        assert_eq!(untitled.title, "Notification");
    }

    #[test]
    fn newest_first_and_capped() {
        let inbox = NotificationInbox::new(Arc::new(MemoryStore::new()));
        for i in 0..(INBOX_CAPACITY + 5) {
            inbox.record(&json!({"title": format!("n{}", i)})).unwrap();
        }

        let entries = inbox.entries();
        assert_eq!(entries.len(), INBOX_CAPACITY);
        assert_eq!(entries[0].title, format!("n{}", INBOX_CAPACITY + 4));
    }

    #[test]
    fn survives_restart() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        NotificationInbox::new(storage.clone())
            .record(&json!({"title": "kept"}))
            .unwrap();

        let reopened = NotificationInbox::new(storage.clone());
        assert_eq!(reopened.entries()[0].title, "kept");

        reopened.clear().unwrap();
        assert!(storage.get(INBOX_KEY).unwrap().is_none());
    }

    #[test]
    fn corrupt_inbox_starts_empty() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        storage.set(INBOX_KEY, "{not json").unwrap();

        assert!(NotificationInbox::new(storage).entries().is_empty());
    }
}
