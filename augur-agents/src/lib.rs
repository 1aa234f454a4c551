//! Augur Agents
//!
//! Everything that talks to a text-completion service:
//! - **Backends**: OpenAI-compatible APIs and Anthropic Claude
//! - **Processor**: turns raw payloads into typed intelligence, with a
//!   heuristic fallback when the AI output is missing or malformed
//! - **Agents**: the analysis contract, a registry with health checks, the
//!   market-intelligence agent and a deterministic signal agent

pub mod backend;
pub mod json;
pub mod learning;
pub mod market;
pub mod processor;
pub mod registry;
pub mod signal;
pub mod traits;

pub use backend::*;
pub use json::*;
pub use learning::*;
pub use market::*;
pub use processor::*;
pub use registry::*;
pub use signal::*;
pub use traits::*;
