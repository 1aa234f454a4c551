//! Augur Sources
//!
//! Ingestion layer for external intelligence sources:
//! - HTTP client construction with optional proxy and user-agent rotation
//! - Sliding one-hour rate limiting per source
//! - Source-type aware payload parsing (JSON APIs, RSS/Atom, HTML)
//! - Concurrent ingestion with per-source failure isolation

pub mod client;
pub mod fetcher;
pub mod parse;
pub mod rate_limit;

pub use client::*;
pub use fetcher::*;
pub use parse::*;
pub use rate_limit::*;
