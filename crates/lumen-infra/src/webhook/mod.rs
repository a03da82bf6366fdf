//! HTTP webhook delivery
//!
//! Events are POSTed as JSON to every active endpoint of the user that
//! subscribes to the event. When the endpoint has a signing secret the body
//! is signed with HMAC-SHA256 and sent as `X-Lumen-Signature: v1=<hex>`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use lumen_core::{WebhookDispatcher, WebhookEvent};
use lumen_db::Queries;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Lumen-Signature";

/// Hex HMAC-SHA256 of `body` keyed by `secret`
pub fn sign_payload(body: &str, secret: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).context("Invalid signing secret")?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// [`WebhookDispatcher`] that delivers over HTTP to the endpoints stored in
/// the database
pub struct HttpWebhookDispatcher {
    client: Client,
    queries: Arc<dyn Queries>,
}

impl HttpWebhookDispatcher {
    pub fn new(queries: Arc<dyn Queries>, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds.max(1)))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client for webhooks")?;
        Ok(Self { client, queries })
    }

    #[tracing::instrument(skip(self, signing_secret, body))]
    async fn send(&self, url: &str, signing_secret: Option<&str>, body: &str) -> Result<()> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "Lumen-Webhook/1.0");

        if let Some(secret) = signing_secret {
            let signature = sign_payload(body, secret)?;
            request = request.header(SIGNATURE_HEADER, format!("v1={signature}"));
        }

        let response = request
            .body(body.to_string())
            .send()
            .await
            .context("Failed to send webhook request")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(anyhow::anyhow!(
                "Webhook returned non-2xx status: {} - {}",
                status.as_u16(),
                text
            ))
        }
    }
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type, file_id = %event.file_id))]
    async fn dispatch(&self, user_id: Uuid, event: WebhookEvent) -> Result<()> {
        let event_name = event.event_type.to_string();
        let endpoints: Vec<_> = self
            .queries
            .webhook_endpoints(user_id)
            .await
            .context("Failed to load webhook endpoints")?
            .into_iter()
            .filter(|e| e.subscribes_to(&event_name))
            .collect();

        if endpoints.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_string(&event).context("Failed to serialize webhook event")?;

        let mut failures = Vec::new();
        for endpoint in &endpoints {
            match self
                .send(&endpoint.url, endpoint.signing_secret.as_deref(), &body)
                .await
            {
                Ok(()) => {
                    tracing::debug!(webhook_id = %endpoint.id, "Webhook delivered");
                }
                Err(e) => {
                    tracing::warn!(webhook_id = %endpoint.id, error = %e, "Webhook delivery failed");
                    failures.push(format!("{}: {:#}", endpoint.url, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "{} of {} webhook deliveries failed: {}",
                failures.len(),
                endpoints.len(),
                failures.join("; ")
            ))
        }
    }
}
