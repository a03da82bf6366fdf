//! Lumen DB Library
//!
//! The [`Queries`] persistence contract, its Postgres implementation and the
//! Postgres job queue ([`PgBroker`]).

pub mod broker;
pub mod error;
pub mod pg;
pub mod pool;
pub mod queries;

pub use broker::{compute_retry_backoff_seconds, PgBroker};
pub use error::{DbError, DbResult};
pub use pg::PgQueries;
pub use pool::{connect, run_migrations};
pub use queries::Queries;
