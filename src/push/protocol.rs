// Push wire types: server -> worker payloads, rendered notifications and
// worker -> window relay messages.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TITLE: &str = "Notification";
pub const REMINDER_ACTION: &str = "REMINDER_ACTION";

/// What the user asked for when clicking a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    Open,
    Done,
    Snooze,
    Reload,
}

impl PushAction {
    /// Clicking the body (no action) means `open`; unknown names also fall back to `open`.
    pub fn resolve(name: Option<&str>) -> Self {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => PushAction::Open,
            Some(name) => name.parse().unwrap_or_else(|_| {
                log::warn!("[push] unknown notification action '{}', treating as open", name);
                PushAction::Open
            }),
        }
    }

    /// Actions that want the window to show the notification's URL.
    pub fn navigates(self) -> bool {
        matches!(self, PushAction::Open | PushAction::Reload)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PushAction::Open => "open",
            PushAction::Done => "done",
            PushAction::Snooze => "snooze",
            PushAction::Reload => "reload",
        }
    }
}

impl std::fmt::Display for PushAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PushAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PushAction::Open),
            "done" => Ok(PushAction::Done),
            "snooze" => Ok(PushAction::Snooze),
            "reload" => Ok(PushAction::Reload),
            _ => Err(format!("Unknown push action: {}", s)),
        }
    }
}

/// Accepts `7`, `"7"` or `null`; anything else reads as no reminder.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// The semantic part of a notification: where it points and which reminder it is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        rename = "reminderId",
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub reminder_id: Option<u64>,
    /// Anything else the server attached, e.g. `"type": "pwa-update"`.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: PushAction, title: &str) -> Self {
        Self {
            action: action.as_str().to_string(),
            title: title.to_string(),
        }
    }
}

/// Buttons shown when the server does not send its own.
pub fn default_actions() -> Vec<NotificationAction> {
    vec![
        NotificationAction::new(PushAction::Open, "Ouvrir"),
        NotificationAction::new(PushAction::Done, "Fait"),
        NotificationAction::new(PushAction::Snooze, "Plus tard"),
    ]
}

/// Empty strings and non-strings read as absent, so the default applies.
fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// A field of the wrong shape reads as absent instead of rejecting the payload.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Message body sent by the push server. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default, deserialize_with = "non_empty_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub badge: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<NotificationData>,
    #[serde(default, deserialize_with = "lenient")]
    pub actions: Option<Vec<NotificationAction>>,
    #[serde(default, deserialize_with = "non_empty_string")]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
    pub tag: String,
}

/// A notification as handed to the platform for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

/// Messages the worker posts to application windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "REMINDER_ACTION")]
    ReminderAction {
        action: PushAction,
        #[serde(rename = "reminderId", default, deserialize_with = "lenient_id")]
        reminder_id: Option<u64>,
        #[serde(default)]
        url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_resolution() {
        assert_eq!(PushAction::resolve(None), PushAction::Open);
        assert_eq!(PushAction::resolve(Some("")), PushAction::Open);
        assert_eq!(PushAction::resolve(Some("done")), PushAction::Done);
        assert_eq!(PushAction::resolve(Some("snooze")), PushAction::Snooze);
        assert_eq!(PushAction::resolve(Some("explode")), PushAction::Open);
        assert!(PushAction::Reload.navigates());
        assert!(!PushAction::Done.navigates());
    }

    #[test]
    fn relay_message_wire_shape() {
        let message = RelayMessage::ReminderAction {
            action: PushAction::Done,
            reminder_id: Some(7),
            url: Some("https://eco.example/reminders".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "REMINDER_ACTION",
                "action": "done",
                "reminderId": 7,
                "url": "https://eco.example/reminders"
            })
        );

        let without_reminder = RelayMessage::ReminderAction {
            action: PushAction::Open,
            reminder_id: None,
            url: Some("https://eco.example/".to_string()),
        };
        assert_eq!(serde_json::to_value(&without_reminder).unwrap()["reminderId"], Value::Null);
    }

    #[test]
    fn relay_message_tolerates_missing_fields() {
        let parsed: RelayMessage =
            serde_json::from_value(json!({"type": "REMINDER_ACTION", "action": "snooze", "reminderId": "9"}))
                .unwrap();
        assert_eq!(
            parsed,
            RelayMessage::ReminderAction {
                action: PushAction::Snooze,
                reminder_id: Some(9),
                url: None
            }
        );
    }

    #[test]
    fn payload_keeps_extra_data() {
        let payload: PushPayload = serde_json::from_value(json!({
            "title": "Nouvelle version",
            "data": {"url": "/", "type": "pwa-update"}
        }))
        .unwrap();
        let data = payload.data.unwrap();
        assert_eq!(data.url.as_deref(), Some("/"));
        assert_eq!(data.reminder_id, None);
        assert_eq!(data.extra["type"], "pwa-update");
    }
}
