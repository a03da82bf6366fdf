//! Round trips against a real Postgres.
//!
//! Set `LUMEN_TEST_DATABASE_URL` to run; the tests skip otherwise.

use chrono::Duration;
use lumen_core::models::{FileStatus, JobStatus, JobType, NewVariant, VariantType};
use lumen_core::{Broker, JobOutcome};
use lumen_db::{run_migrations, PgBroker, PgQueries, Queries};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

async fn pool() -> Option<PgPool> {
    let url = std::env::var("LUMEN_TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

async fn insert_file(pool: &PgPool) -> (Uuid, Uuid) {
    let file_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO files (id, user_id, storage_key, content_type, size_bytes) VALUES ($1, $2, $3, 'image/jpeg', 10)",
    )
    .bind(file_id)
    .bind(user_id)
    .bind(format!("uploads/{file_id}/photo.jpg"))
    .execute(pool)
    .await
    .unwrap();
    (file_id, user_id)
}

#[tokio::test]
async fn job_lifecycle_and_variants() {
    let Some(pool) = pool().await else {
        eprintln!("skipping: LUMEN_TEST_DATABASE_URL not set");
        return;
    };
    let queries = PgQueries::new(pool.clone());
    let (file_id, user_id) = insert_file(&pool).await;

    let job = queries.create_job(file_id, JobType::Thumbnail).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    queries.mark_job_running(job.id).await.unwrap();
    queries.mark_job_failed(job.id, "boom").await.unwrap();
    let failed = queries.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));

    queries.mark_job_running(job.id).await.unwrap();
    queries.mark_job_completed(job.id).await.unwrap();
    let done = queries.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.error_message.is_none());

    let variant = NewVariant {
        file_id,
        variant_type: VariantType::Thumbnail,
        content_type: "image/jpeg".to_string(),
        size_bytes: 1234,
        storage_key: format!("processed/{file_id}/thumbnail/thumb.jpg"),
        width: Some(200),
        height: Some(200),
        duration_seconds: None,
        resolution: None,
    };
    queries.create_variant(variant.clone()).await.unwrap();
    queries.create_variant(variant).await.unwrap();
    assert_eq!(queries.list_variants(file_id).await.unwrap().len(), 2);

    queries
        .update_file_status(file_id, FileStatus::Completed)
        .await
        .unwrap();
    let file = queries.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Completed);

    queries.increment_usage(user_id, 1234).await.unwrap();
    queries.increment_usage(user_id, 1).await.unwrap();
    let settings = queries.get_user_settings(user_id).await.unwrap();
    assert!(!settings.auto_delete_original);

    assert!(queries.get_file(Uuid::new_v4()).await.unwrap().is_none());
    assert!(queries
        .update_file_status(Uuid::new_v4(), FileStatus::Failed)
        .await
        .is_err());
}

#[tokio::test]
async fn broker_retries_then_parks() {
    let Some(pool) = pool().await else {
        eprintln!("skipping: LUMEN_TEST_DATABASE_URL not set");
        return;
    };
    sqlx::query("DELETE FROM job_queue").execute(&pool).await.unwrap();
    let broker = PgBroker::new(pool.clone(), 2);

    let payload = serde_json::json!({"file_id": Uuid::new_v4(), "width": 10, "height": 10});
    let queue_id = broker.enqueue(JobType::Thumbnail, payload).await.unwrap();

    let job = broker.dequeue().await.unwrap().unwrap();
    assert_eq!(job.id, queue_id);
    assert_eq!(job.attempt, 1);
    assert!(broker.dequeue().await.unwrap().is_none(), "claimed job is invisible");

    broker
        .ack(queue_id, JobOutcome::Retry { error: "io".into() })
        .await
        .unwrap();
    // Backoff pushes run_at into the future; pull it back for the test
    sqlx::query("UPDATE job_queue SET run_at = NOW() WHERE id = $1")
        .bind(queue_id)
        .execute(&pool)
        .await
        .unwrap();

    let job = broker.dequeue().await.unwrap().unwrap();
    assert_eq!(job.attempt, 2);
    broker
        .ack(queue_id, JobOutcome::Retry { error: "io".into() })
        .await
        .unwrap();

    let (status,): (String,) = sqlx::query_as("SELECT status FROM job_queue WHERE id = $1")
        .bind(queue_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "dead");

    assert_eq!(broker.requeue_stale(Duration::seconds(60)).await.unwrap(), 0);
}
