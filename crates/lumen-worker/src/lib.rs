//! Lumen Worker Library
//!
//! The generic file job pipeline, per-job-type configurations, the HLS
//! handler, the worker pool and the brokers it can pull from.

pub mod handler;
pub mod hls;
pub mod jobs;
pub mod memory_broker;
pub mod pipeline;
pub mod pool;
pub mod submit;

pub use handler::{Handlers, JobHandler};
pub use hls::HlsHandler;
pub use jobs::default_handlers;
pub use memory_broker::MemoryBroker;
pub use pipeline::{FileJobBuilder, JobConfig, JobDeps};
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use submit::{submit_job, SubmittedJob};
