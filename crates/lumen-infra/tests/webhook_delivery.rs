//! Webhook delivery against a mock HTTP receiver.

#![cfg(feature = "webhook")]

use async_trait::async_trait;
use chrono::Utc;
use lumen_core::models::{
    File, FileStatus, JobType, NewVariant, ProcessingJob, UserSettings, Variant, WebhookEndpoint,
};
use lumen_core::{WebhookDispatcher, WebhookEvent, WebhookEventType};
use lumen_db::{DbResult, Queries};
use lumen_infra::{sign_payload, HttpWebhookDispatcher, SIGNATURE_HEADER};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Only webhook endpoints are backed; the pipeline methods are never called
struct EndpointsOnly(Vec<WebhookEndpoint>);

#[async_trait]
impl Queries for EndpointsOnly {
    async fn get_file(&self, _: Uuid) -> DbResult<Option<File>> {
        unimplemented!()
    }
    async fn update_file_status(&self, _: Uuid, _: FileStatus) -> DbResult<()> {
        unimplemented!()
    }
    async fn mark_original_deleted(&self, _: Uuid) -> DbResult<()> {
        unimplemented!()
    }
    async fn create_job(&self, _: Uuid, _: JobType) -> DbResult<ProcessingJob> {
        unimplemented!()
    }
    async fn get_job(&self, _: Uuid) -> DbResult<Option<ProcessingJob>> {
        unimplemented!()
    }
    async fn mark_job_running(&self, _: Uuid) -> DbResult<()> {
        unimplemented!()
    }
    async fn mark_job_completed(&self, _: Uuid) -> DbResult<()> {
        unimplemented!()
    }
    async fn mark_job_failed(&self, _: Uuid, _: &str) -> DbResult<()> {
        unimplemented!()
    }
    async fn create_variant(&self, _: NewVariant) -> DbResult<Variant> {
        unimplemented!()
    }
    async fn list_variants(&self, _: Uuid) -> DbResult<Vec<Variant>> {
        unimplemented!()
    }
    async fn increment_usage(&self, _: Uuid, _: i64) -> DbResult<()> {
        unimplemented!()
    }
    async fn get_user_settings(&self, _: Uuid) -> DbResult<UserSettings> {
        unimplemented!()
    }
    async fn webhook_endpoints(&self, user_id: Uuid) -> DbResult<Vec<WebhookEndpoint>> {
        Ok(self
            .0
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

fn endpoint(user_id: Uuid, url: String, secret: Option<&str>, events: &[&str]) -> WebhookEndpoint {
    WebhookEndpoint {
        id: Uuid::new_v4(),
        user_id,
        url,
        signing_secret: secret.map(str::to_string),
        events: events.iter().map(|e| e.to_string()).collect(),
        is_active: true,
    }
}

fn completed_event() -> WebhookEvent {
    WebhookEvent {
        event_type: WebhookEventType::ProcessingCompleted,
        file_id: Uuid::new_v4(),
        job_id: Some(Uuid::new_v4()),
        job_type: JobType::Thumbnail,
        variant_key: Some("processed/x/thumbnail/thumb.jpg".to_string()),
        content_type: Some("image/jpeg".to_string()),
        size_bytes: Some(2048),
        duration_seconds: None,
        error: None,
        occurred_at: Utc::now(),
    }
}

#[tokio::test]
async fn signed_delivery_to_subscribed_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks"))
        .and(header("Content-Type", "application/json"))
        .and(header_exists(SIGNATURE_HEADER))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/failures-only"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let user_id = Uuid::new_v4();
    let queries = Arc::new(EndpointsOnly(vec![
        endpoint(user_id, format!("{}/hooks", server.uri()), Some("s3cret"), &[]),
        endpoint(
            user_id,
            format!("{}/failures-only", server.uri()),
            None,
            &["processing.failed"],
        ),
    ]));
    let dispatcher = HttpWebhookDispatcher::new(queries, 5).unwrap();

    let event = completed_event();
    dispatcher.dispatch(user_id, event.clone()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let signature = requests[0]
        .headers
        .get(SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(signature, format!("v1={}", sign_payload(&body, "s3cret").unwrap()));

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["event_type"], "processing.completed");
    assert_eq!(json["file_id"], event.file_id.to_string());
    assert_eq!(json["size_bytes"], 2048);
}

#[tokio::test]
async fn non_2xx_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let user_id = Uuid::new_v4();
    let queries = Arc::new(EndpointsOnly(vec![endpoint(
        user_id,
        server.uri(),
        None,
        &[],
    )]));
    let dispatcher = HttpWebhookDispatcher::new(queries, 5).unwrap();

    let err = dispatcher
        .dispatch(user_id, completed_event())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn no_endpoints_is_a_no_op() {
    let dispatcher = HttpWebhookDispatcher::new(Arc::new(EndpointsOnly(Vec::new())), 5).unwrap();
    dispatcher
        .dispatch(Uuid::new_v4(), completed_event())
        .await
        .unwrap();
}
