use crate::api::ApiError;
use crate::interceptor::AuthenticatedClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
}

/// Reminder as returned by the backend. Only `id` matters to the push relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: u64,
    pub scheduled_at_utc: String,
    pub timezone: String,
    pub recurrence: Recurrence,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CreatedReminder {
    pub id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateReminderRequest<'a> {
    progression_id: u64,
    scheduled_at: &'a str,
    timezone: &'a str,
    recurrence: Recurrence,
}

/// Completion/snooze operations the push bridge invokes.
#[async_trait]
pub trait ReminderActions: Send + Sync {
    async fn complete(&self, id: u64) -> Result<(), ApiError>;
    async fn snooze(&self, id: u64) -> Result<(), ApiError>;
}

pub struct RemindersService {
    client: Arc<AuthenticatedClient>,
    timezone: String,
}

impl RemindersService {
    pub fn new(client: Arc<AuthenticatedClient>, timezone: &str) -> Self {
        Self {
            client,
            timezone: timezone.to_string(),
        }
    }

    /// Schedules a reminder for a challenge progression.
    /// `when_local_iso` is wall-clock time in the configured timezone.
    pub async fn create_by_progression(
        &self,
        progression_id: u64,
        when_local_iso: &str,
        recurrence: Recurrence,
    ) -> Result<CreatedReminder, ApiError> {
        let body = CreateReminderRequest {
            progression_id,
            scheduled_at: when_local_iso,
            timezone: &self.timezone,
            recurrence,
        };
        self.client.post_json("/reminders", &body).await
    }
}

#[async_trait]
impl ReminderActions for RemindersService {
    async fn complete(&self, id: u64) -> Result<(), ApiError> {
        self.client
            .post(&format!("/reminders/{}/complete", id), &serde_json::json!({}))
            .await?;
        log::info!("Reminder {} marked done", id);
        Ok(())
    }

    async fn snooze(&self, id: u64) -> Result<(), ApiError> {
        self.client
            .post(&format!("/reminders/{}/snooze", id), &serde_json::json!({}))
            .await?;
        log::info!("Reminder {} snoozed", id);
        Ok(())
    }
}
