//! In-memory collaborators for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use lumen_core::models::{
    File, FileStatus, JobStatus, JobType, NewVariant, ProcessingJob, UserSettings, Variant,
    WebhookEndpoint,
};
use lumen_core::{Config, StorageBackend, WebhookDispatcher, WebhookEvent};
use lumen_db::{DbError, DbResult, Queries};
use lumen_storage::{LocalStorage, Storage, StorageError, StorageResult};
use lumen_worker::JobDeps;

#[derive(Default)]
struct State {
    files: HashMap<Uuid, File>,
    jobs: HashMap<Uuid, ProcessingJob>,
    variants: Vec<Variant>,
    usage: HashMap<Uuid, i64>,
    settings: HashMap<Uuid, UserSettings>,
}

#[derive(Default)]
pub struct FakeQueries {
    state: Mutex<State>,
}

impl FakeQueries {
    pub fn insert_file(&self, file: File) {
        self.state.lock().unwrap().files.insert(file.id, file);
    }

    pub fn remove_file(&self, file_id: Uuid) {
        self.state.lock().unwrap().files.remove(&file_id);
    }

    pub fn file(&self, file_id: Uuid) -> File {
        self.state.lock().unwrap().files[&file_id].clone()
    }

    pub fn job(&self, job_id: Uuid) -> ProcessingJob {
        self.state.lock().unwrap().jobs[&job_id].clone()
    }

    pub fn jobs(&self) -> Vec<ProcessingJob> {
        self.state.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.state.lock().unwrap().variants.clone()
    }

    pub fn usage(&self, user_id: Uuid) -> i64 {
        self.state
            .lock()
            .unwrap()
            .usage
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_auto_delete(&self, user_id: Uuid) {
        self.state.lock().unwrap().settings.insert(
            user_id,
            UserSettings {
                user_id,
                auto_delete_original: true,
            },
        );
    }

    fn update_job(&self, job_id: Uuid, f: impl FnOnce(&mut ProcessingJob)) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| DbError::not_found("job", job_id))?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl Queries for FakeQueries {
    async fn get_file(&self, file_id: Uuid) -> DbResult<Option<File>> {
        Ok(self.state.lock().unwrap().files.get(&file_id).cloned())
    }

    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| DbError::not_found("file", file_id))?;
        file.status = status;
        Ok(())
    }

    async fn mark_original_deleted(&self, file_id: Uuid) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let file = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| DbError::not_found("file", file_id))?;
        file.original_deleted = true;
        Ok(())
    }

    async fn create_job(&self, file_id: Uuid, job_type: JobType) -> DbResult<ProcessingJob> {
        let job = ProcessingJob {
            id: Uuid::new_v4(),
            file_id,
            job_type,
            status: JobStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.state.lock().unwrap().jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ProcessingJob>> {
        Ok(self.state.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn mark_job_running(&self, job_id: Uuid) -> DbResult<()> {
        self.update_job(job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.error_message = None;
        })
    }

    async fn mark_job_completed(&self, job_id: Uuid) -> DbResult<()> {
        self.update_job(job_id, |job| {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> DbResult<()> {
        let error = error.to_string();
        self.update_job(job_id, |job| {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error_message = Some(error);
        })
    }

    async fn create_variant(&self, variant: NewVariant) -> DbResult<Variant> {
        let row = Variant {
            id: Uuid::new_v4(),
            file_id: variant.file_id,
            variant_type: variant.variant_type,
            content_type: variant.content_type,
            size_bytes: variant.size_bytes,
            storage_key: variant.storage_key,
            width: variant.width,
            height: variant.height,
            duration_seconds: variant.duration_seconds,
            resolution: variant.resolution,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().variants.push(row.clone());
        Ok(row)
    }

    async fn list_variants(&self, file_id: Uuid) -> DbResult<Vec<Variant>> {
        Ok(self
            .variants()
            .into_iter()
            .filter(|v| v.file_id == file_id)
            .collect())
    }

    async fn increment_usage(&self, user_id: Uuid, bytes: i64) -> DbResult<()> {
        *self.state.lock().unwrap().usage.entry(user_id).or_default() += bytes;
        Ok(())
    }

    async fn get_user_settings(&self, user_id: Uuid) -> DbResult<UserSettings> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .settings
            .get(&user_id)
            .cloned()
            .unwrap_or(UserSettings {
                user_id,
                auto_delete_original: false,
            }))
    }

    async fn webhook_endpoints(&self, _user_id: Uuid) -> DbResult<Vec<WebhookEndpoint>> {
        Ok(Vec::new())
    }
}

/// Records every dispatched event
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<(Uuid, WebhookEvent)>>,
}

impl RecordingDispatcher {
    pub fn events(&self) -> Vec<(Uuid, WebhookEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Webhooks are fire-and-forget, so poll until `count` arrived
    pub async fn wait_for(&self, count: usize) -> Vec<(Uuid, WebhookEvent)> {
        for _ in 0..200 {
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} webhook events, got {}", self.events().len());
    }
}

#[async_trait]
impl WebhookDispatcher for RecordingDispatcher {
    async fn dispatch(&self, user_id: Uuid, event: WebhookEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((user_id, event));
        Ok(())
    }
}

/// Local storage whose uploads always fail
pub struct FailingUploads(pub Arc<dyn Storage>);

#[async_trait]
impl Storage for FailingUploads {
    async fn download(&self, storage_key: &str) -> StorageResult<Bytes> {
        self.0.download(storage_key).await
    }

    async fn upload(&self, storage_key: &str, _data: Bytes, _content_type: &str) -> StorageResult<()> {
        Err(StorageError::UploadFailed(format!("{storage_key}: connection reset")))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.0.delete(storage_key).await
    }

    async fn get_presigned_url(&self, storage_key: &str, expires_in: Duration) -> StorageResult<String> {
        self.0.get_presigned_url(storage_key, expires_in).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.0.exists(storage_key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.0.backend_type()
    }
}

/// Local storage whose downloads always fail
pub struct FailingDownloads(pub Arc<dyn Storage>);

#[async_trait]
impl Storage for FailingDownloads {
    async fn download(&self, storage_key: &str) -> StorageResult<Bytes> {
        Err(StorageError::DownloadFailed(format!("{storage_key}: connection reset")))
    }

    async fn upload(&self, storage_key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.0.upload(storage_key, data, content_type).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.0.delete(storage_key).await
    }

    async fn get_presigned_url(&self, storage_key: &str, expires_in: Duration) -> StorageResult<String> {
        self.0.get_presigned_url(storage_key, expires_in).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.0.exists(storage_key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.0.backend_type()
    }
}

/// Persistence that loses its connection when a variant is recorded
pub struct UnavailableVariants(pub Arc<FakeQueries>);

#[async_trait]
impl Queries for UnavailableVariants {
    async fn get_file(&self, file_id: Uuid) -> DbResult<Option<File>> {
        self.0.get_file(file_id).await
    }

    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> DbResult<()> {
        self.0.update_file_status(file_id, status).await
    }

    async fn mark_original_deleted(&self, file_id: Uuid) -> DbResult<()> {
        self.0.mark_original_deleted(file_id).await
    }

    async fn create_job(&self, file_id: Uuid, job_type: JobType) -> DbResult<ProcessingJob> {
        self.0.create_job(file_id, job_type).await
    }

    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ProcessingJob>> {
        self.0.get_job(job_id).await
    }

    async fn mark_job_running(&self, job_id: Uuid) -> DbResult<()> {
        self.0.mark_job_running(job_id).await
    }

    async fn mark_job_completed(&self, job_id: Uuid) -> DbResult<()> {
        self.0.mark_job_completed(job_id).await
    }

    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> DbResult<()> {
        self.0.mark_job_failed(job_id, error).await
    }

    async fn create_variant(&self, _variant: NewVariant) -> DbResult<Variant> {
        Err(DbError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn list_variants(&self, file_id: Uuid) -> DbResult<Vec<Variant>> {
        self.0.list_variants(file_id).await
    }

    async fn increment_usage(&self, user_id: Uuid, bytes: i64) -> DbResult<()> {
        self.0.increment_usage(user_id, bytes).await
    }

    async fn get_user_settings(&self, user_id: Uuid) -> DbResult<UserSettings> {
        self.0.get_user_settings(user_id).await
    }

    async fn webhook_endpoints(&self, user_id: Uuid) -> DbResult<Vec<WebhookEndpoint>> {
        self.0.webhook_endpoints(user_id).await
    }
}

pub fn config(storage_path: &str) -> Config {
    let storage_path = storage_path.to_string();
    Config::from_lookup(move |key| match key {
        "DATABASE_URL" => Some("postgres://localhost/lumen".to_string()),
        "STORAGE_BACKEND" => Some("local".to_string()),
        "LOCAL_STORAGE_PATH" => Some(storage_path.clone()),
        "LOCAL_STORAGE_BASE_URL" => Some("http://localhost/media".to_string()),
        _ => None,
    })
    .expect("test config")
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub queries: Arc<FakeQueries>,
    pub webhooks: Arc<RecordingDispatcher>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path().to_str().unwrap());
        let storage: Arc<dyn Storage> = Arc::new(
            LocalStorage::new(dir.path(), "http://localhost/media".to_string())
                .await
                .unwrap(),
        );
        Self {
            dir,
            config,
            storage,
            queries: Arc::new(FakeQueries::default()),
            webhooks: Arc::new(RecordingDispatcher::default()),
        }
    }

    pub fn deps(&self) -> JobDeps {
        self.deps_with_storage(self.storage.clone())
    }

    pub fn deps_with_storage(&self, storage: Arc<dyn Storage>) -> JobDeps {
        self.deps_with(storage, self.queries.clone())
    }

    pub fn deps_with(&self, storage: Arc<dyn Storage>, queries: Arc<dyn Queries>) -> JobDeps {
        JobDeps {
            storage,
            queries,
            registry: lumen_processing::build_registry(&self.config),
            webhooks: self.webhooks.clone(),
        }
    }

    /// Store `data` as an original and register its file row
    pub async fn upload_original(&self, filename: &str, content_type: &str, data: Vec<u8>) -> File {
        let id = Uuid::new_v4();
        let storage_key = format!("uploads/{id}/{filename}");
        let size_bytes = data.len() as i64;
        self.storage
            .upload(&storage_key, Bytes::from(data), content_type)
            .await
            .unwrap();
        let file = File {
            id,
            user_id: Uuid::new_v4(),
            storage_key,
            content_type: content_type.to_string(),
            size_bytes,
            status: FileStatus::Pending,
            deleted: false,
            original_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.queries.insert_file(file.clone());
        file
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([200, (x % 256) as u8, (y % 256) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg).unwrap();
    out.into_inner()
}
