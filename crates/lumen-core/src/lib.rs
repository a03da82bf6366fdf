//! Lumen Core Library
//!
//! Domain models, configuration, the permanent/transient job error and the
//! collaborator contracts (broker, webhook dispatch) shared by every lumen crate.

pub mod broker;
pub mod config;
pub mod job_error;
pub mod models;
pub mod storage_types;
pub mod webhook;

// Re-export commonly used types
pub use broker::{Broker, JobOutcome, QueuedJob};
pub use config::{Config, LogFormat, StorageConfig, ToolPaths, VideoConfig, WorkerConfig};
pub use job_error::{JobError, JobResultExt};
pub use storage_types::StorageBackend;
pub use webhook::{NoopWebhookDispatcher, WebhookDispatcher, WebhookEvent, WebhookEventType};
