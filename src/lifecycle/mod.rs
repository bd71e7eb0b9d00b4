//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → consumer loop stops reading → strategy drains → offsets committed → exit
//! ```
//!
//! # Design Decisions
//! - Shutdown always drains in-flight batches before returning
//! - Config reload goes through the file watcher, not SIGHUP

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
