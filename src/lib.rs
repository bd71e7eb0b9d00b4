//! Uptime check result ingestion pipeline.

pub mod config;
pub mod consumer;
pub mod lifecycle;
pub mod observability;
pub mod store;
pub mod uptime;

pub use config::PipelineConfig;
pub use lifecycle::Shutdown;
pub use uptime::{ProcessOutcome, ResultDispatcher};
