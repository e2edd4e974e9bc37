use crate::api::ApiError;
use crate::interceptor::AuthenticatedClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Content encoding the backend uses when encrypting push bodies.
pub const PUSH_ENCODING: &str = "aes128gcm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A browser-style push subscription as produced by the push service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    endpoint: &'a str,
    keys: &'a SubscriptionKeys,
    encoding: &'a str,
}

#[derive(Serialize)]
struct UnsubscribeRequest<'a> {
    endpoint: &'a str,
}

pub struct PushSubscriptionService {
    client: Arc<AuthenticatedClient>,
    vapid_public_key: Option<String>,
}

impl PushSubscriptionService {
    pub fn new(client: Arc<AuthenticatedClient>, vapid_public_key: Option<String>) -> Self {
        Self {
            client,
            vapid_public_key: vapid_public_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn vapid_public_key(&self) -> Option<&str> {
        self.vapid_public_key.as_deref()
    }

    /// Registers `subscription` with the backend. Returns whether push is now enabled.
    pub async fn enable(&self, subscription: &PushSubscription) -> bool {
        if self.vapid_public_key.is_none() {
            log::warn!("Push disabled: no VAPID public key configured");
            return false;
        }

        let body = SubscribeRequest {
            endpoint: &subscription.endpoint,
            keys: &subscription.keys,
            encoding: PUSH_ENCODING,
        };

        match self.client.post("/push/subscribe", &body).await {
            Ok(_) => {
                log::info!("Push subscription registered");
                true
            }
            Err(e) => {
                log::error!("Push subscription failed: {}", e);
                false
            }
        }
    }

    pub async fn disable(&self, endpoint: &str) {
        if let Err(e) = self.unsubscribe(endpoint).await {
            log::error!("Push unsubscription failed: {}", e);
        }
    }

    async fn unsubscribe(&self, endpoint: &str) -> Result<(), ApiError> {
        self.client
            .post("/push/unsubscribe", &UnsubscribeRequest { endpoint })
            .await?;
        log::info!("Push subscription removed");
        Ok(())
    }
}
