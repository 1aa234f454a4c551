//! Augur Runtime
//!
//! Ties the layers together:
//! - Multi-agent orchestration with per-agent timeouts and synthesis
//! - Streaming trend generation in per-category batches
//! - TOML engine configuration
//! - The `IntelligenceEngine` facade over ingestion, analysis and caching

pub mod batch;
pub mod config;
pub mod engine;
pub mod orchestrator;

pub use batch::*;
pub use config::*;
pub use engine::*;
pub use orchestrator::*;
