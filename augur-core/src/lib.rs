//! Augur Core - data model and shared state for the intelligence engine
//!
//! This crate provides the foundational primitives:
//! - Raw and processed intelligence records
//! - Analysis, reasoning and synthesis types exchanged with agents
//! - Keyword heuristics used when AI enrichment is unavailable
//! - Source registry types
//! - Weighted confidence scoring with historical accuracy
//! - A bounded cache that evicts by value instead of recency

pub mod analysis;
pub mod cache;
pub mod confidence;
pub mod heuristics;
pub mod intelligence;
pub mod sources;
pub mod trends;

pub use analysis::*;
pub use cache::*;
pub use confidence::*;
pub use heuristics::*;
pub use intelligence::*;
pub use sources::*;
pub use trends::*;

/// Lifetime of a processed intelligence record, in hours
pub const DEFAULT_EXPIRY_HOURS: i64 = 24;

/// Default cache entry TTL in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Default maximum number of cache entries
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Neutral confidence used when nothing better is known
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Clamp a score into `[0, 1]`. NaN is treated as zero.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(f64::INFINITY), 1.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }
}
