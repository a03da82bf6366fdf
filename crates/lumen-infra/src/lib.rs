//! Lumen Infrastructure Library
//!
//! Process-wide concerns that sit outside the job pipeline: tracing setup
//! and outbound webhook delivery.

pub mod telemetry;
#[cfg(feature = "webhook")]
pub mod webhook;

pub use telemetry::init_telemetry;
#[cfg(feature = "webhook")]
pub use webhook::{sign_payload, HttpWebhookDispatcher, SIGNATURE_HEADER};
