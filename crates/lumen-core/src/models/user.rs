use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Per-user processing preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct UserSettings {
    pub user_id: Uuid,
    /// Remove the uploaded original once a transcode variant exists
    pub auto_delete_original: bool,
}

/// A registered webhook receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub signing_secret: Option<String>,
    /// Subscribed event names; empty means all events
    pub events: Vec<String>,
    pub is_active: bool,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.is_active && (self.events.is_empty() || self.events.iter().any(|e| e == event))
    }
}
