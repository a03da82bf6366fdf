//! Webhook notification contract.
//!
//! The processing pipeline fires events on a detached task and never waits on
//! delivery; implementations report failures through their return value and
//! the caller only logs them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::JobType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WebhookEventType {
    #[serde(rename = "processing.completed")]
    ProcessingCompleted,
    #[serde(rename = "processing.failed")]
    ProcessingFailed,
}

impl Display for WebhookEventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            WebhookEventType::ProcessingCompleted => write!(f, "processing.completed"),
            WebhookEventType::ProcessingFailed => write!(f, "processing.failed"),
        }
    }
}

impl FromStr for WebhookEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing.completed" => Ok(WebhookEventType::ProcessingCompleted),
            "processing.failed" => Ok(WebhookEventType::ProcessingFailed),
            _ => Err(anyhow::anyhow!("Invalid webhook event type: {}", s)),
        }
    }
}

/// Event body delivered to webhook receivers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub file_id: Uuid,
    pub job_id: Option<Uuid>,
    pub job_type: JobType,
    pub variant_key: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, user_id: Uuid, event: WebhookEvent) -> anyhow::Result<()>;
}

/// Dispatcher for deployments without webhook delivery
pub struct NoopWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for NoopWebhookDispatcher {
    async fn dispatch(&self, _user_id: Uuid, _event: WebhookEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
