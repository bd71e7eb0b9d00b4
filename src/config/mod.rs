//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PipelineConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → region descriptors swapped into the RegionSource
//!     → next sampled rebalance observes the new regions
//! ```
//!
//! # Design Decisions
//! - Only region descriptors are hot-swapped; everything else needs a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::PipelineConfig;
pub use schema::ConsumerConfig;
pub use schema::ConsumerMode;
pub use schema::RegionConfig;
pub use schema::ThresholdConfig;
