//! Uptime result processing.
//!
//! # Data Flow
//! ```text
//! CheckResult
//!     → dispatcher.rs (resolve bindings, ordering check per binding)
//!     → tracker.rs (failure/success streaks in the state store)
//!     → issues.rs (escalate / resolve)
//!     → onboarding.rs (graduate / tear down auto-detected monitors)
//!     → rebalance.rs (sampled region reconciliation)
//!     → analytics.rs (one record per binding)
//! ```
//!
//! # Design Decisions
//! - Every external system sits behind a trait so tests run in memory
//! - Counters live in the shared state store, never in the process

pub mod analytics;
pub mod blacklist;
pub mod dispatcher;
pub mod error;
pub mod issues;
pub mod onboarding;
pub mod producer;
pub mod rebalance;
pub mod repository;
pub mod tracker;
pub mod types;

pub use dispatcher::{
    BindingOutcome, BindingResult, Collaborators, HandledResult, ProcessOutcome, ProcessedResult,
    ResultDispatcher,
};
pub use error::ProcessingError;
