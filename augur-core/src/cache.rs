//! Confidence-scored intelligence cache
//!
//! A bounded in-process store keyed by logical query:
//! - Entries expire after a per-entry TTL; expired entries are dropped lazily on read
//! - High-confidence intelligence gets a longer shelf life
//! - At capacity, the lowest-value ~10% of entries are evicted before inserting,
//!   where value blends freshness, access frequency and confidence
//! - Every entry carries a SHA-256 of its serialized data; a mismatch is a miss
//!
//! All mutation happens under one write lock, so readers never observe a
//! partially evicted store.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    clamp_unit, MarketChange, ProcessedIntelligence, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CACHE_TTL_SECS, NEUTRAL_CONFIDENCE,
};

/// Tag carried by every cached processed intelligence record
pub const INTELLIGENCE_TAG: &str = "intelligence";

const AGE_WEIGHT: f64 = 0.3;
const ACCESS_WEIGHT: f64 = 0.4;
const CONFIDENCE_WEIGHT: f64 = 0.3;

/// Accesses at which an entry's access score saturates
const ACCESS_SATURATION: f64 = 10.0;

/// Reference age for the age score, in hours
const AGE_HORIZON_HOURS: f64 = 24.0;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid invalidation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache sizing and expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
    /// TTL applied when a write does not specify one
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CACHE_CAPACITY,
            default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.default_ttl_secs)
    }
}

/// Per-write options
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub ttl: Option<std::time::Duration>,
    pub tags: Vec<String>,
    pub confidence: Option<f64>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// One stored value with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON of the stored value
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub tags: Vec<String>,
    pub confidence: f64,
    /// Hex SHA-256 of `data`
    pub data_hash: String,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether `data` still matches `data_hash`
    pub fn verify(&self) -> bool {
        hash_data(&self.data) == self.data_hash
    }

    /// `0.3·age + 0.4·access + 0.3·confidence`.
    ///
    /// The age score is `1 - age/24h` and goes negative past a day.
    pub fn value_score(&self, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - self.created_at).num_milliseconds() as f64 / 3_600_000.0;
        let age_score = 1.0 - age_hours / AGE_HORIZON_HOURS;
        let access_score = (self.access_count as f64 / ACCESS_SATURATION).min(1.0);

        AGE_WEIGHT * age_score + ACCESS_WEIGHT * access_score + CONFIDENCE_WEIGHT * self.confidence
    }

    fn mentions_any(&self, needles: &[String]) -> bool {
        let data = self.data.to_lowercase();
        let tags: Vec<String> = self.tags.iter().map(|t| t.to_lowercase()).collect();
        needles.iter().any(|needle| {
            data.contains(needle.as_str()) || tags.iter().any(|t| t.contains(needle.as_str()))
        })
    }
}

/// Hex SHA-256 of a serialized value
pub fn hash_data(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Entries dropped for hash mismatch or undecodable data
    pub integrity_failures: u64,
    pub entry_count: usize,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// TTL tier for a confidence: >0.8 doubles the default, >0.6 keeps it, else halves it
pub fn ttl_for_confidence(default_ttl: std::time::Duration, confidence: f64) -> std::time::Duration {
    let confidence = clamp_unit(confidence);
    if confidence > 0.8 {
        default_ttl * 2
    } else if confidence > 0.6 {
        default_ttl
    } else {
        default_ttl / 2
    }
}

/// The shared intelligence cache
#[derive(Debug)]
pub struct IntelCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    integrity_failures: AtomicU64,
}

impl Default for IntelCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl IntelCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn capacity(&self) -> usize {
        self.config.max_entries.max(1)
    }

    /// Store a value
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        options: CacheOptions,
    ) -> Result<(), CacheError> {
        self.set_at(key, data, options, Utc::now())
    }

    /// Store a value as of `now`
    pub fn set_at<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        options: CacheOptions,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let serialized = serde_json::to_string(data)?;
        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64));

        let entry = CacheEntry {
            key: key.to_string(),
            data_hash: hash_data(&serialized),
            data: serialized,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
            last_accessed: now,
            tags: options.tags,
            confidence: clamp_unit(options.confidence.unwrap_or(NEUTRAL_CONFIDENCE)),
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(key) && entries.len() >= self.capacity() {
            let evicted = Self::evict_lowest_value(&mut entries, now);
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Drop the lowest-value ~10% of entries (at least one). Returns the count.
    fn evict_lowest_value(entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) -> usize {
        let count = (entries.len() / 10).max(1);

        let mut scored: Vec<(f64, DateTime<Utc>, String)> = entries
            .values()
            .map(|e| (e.value_score(now), e.last_accessed, e.key.clone()))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (score, _, key) in scored.into_iter().take(count) {
            debug!("Evicting cache entry {} (value {:.3})", key, score);
            entries.remove(&key);
        }
        count
    }

    /// Serialized data for a key, or `None` on miss
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.get_raw_at(key, Utc::now())
    }

    pub fn get_raw_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        self.lookup(key, now, |data| Some(data.to_string()))
    }

    /// Typed read. Undecodable data counts as corruption and drops the entry.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Option<T> {
        self.lookup(key, now, |data| serde_json::from_str(data).ok())
    }

    fn lookup<R>(
        &self,
        key: &str,
        now: DateTime<Utc>,
        decode: impl FnOnce(&str) -> Option<R>,
    ) -> Option<R> {
        let mut entries = self.entries.write();

        let Some(entry) = entries.get_mut(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired(now) {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let decoded = if entry.verify() { decode(&entry.data) } else { None };
        match decoded {
            Some(value) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                warn!("Dropping corrupt cache entry {}", key);
                entries.remove(key);
                self.integrity_failures.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Cache a processed record with a TTL derived from its confidence
    pub fn cache_with_confidence(
        &self,
        key: &str,
        record: &ProcessedIntelligence,
    ) -> Result<(), CacheError> {
        self.cache_with_confidence_at(key, record, Utc::now())
    }

    pub fn cache_with_confidence_at(
        &self,
        key: &str,
        record: &ProcessedIntelligence,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let ttl = ttl_for_confidence(self.config.default_ttl(), record.confidence);

        let mut tags = vec![
            INTELLIGENCE_TAG.to_string(),
            record.intelligence_type.as_str().to_string(),
        ];
        for tag in &record.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let options = CacheOptions::new()
            .ttl(ttl)
            .tags(tags)
            .confidence(record.confidence);
        self.set_at(key, record, options, now)
    }

    /// Remove every entry whose key matches a regular expression
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex = Regex::new(pattern)?;
        let removed = self.remove_where(|entry| regex.is_match(&entry.key));
        info!("Invalidated {} entries matching /{}/", removed, pattern);
        Ok(removed)
    }

    /// Remove every entry whose data or tags mention an affected entity
    pub fn invalidate_market_change(&self, change: &MarketChange) -> usize {
        let needles: Vec<String> = change
            .affected_entities
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        if needles.is_empty() {
            return 0;
        }

        let removed = self.remove_where(|entry| entry.mentions_any(&needles));
        info!(
            "Market change \"{}\" invalidated {} entries",
            change.description, removed
        );
        removed
    }

    /// Remove every entry carrying any of the tags
    pub fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let removed = self.remove_where(|entry| entry.tags.iter().any(|t| tags.contains(t)));
        debug!("Invalidated {} entries by tags {:?}", removed, tags);
        removed
    }

    fn remove_where(&self, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !predicate(entry));
        before - entries.len()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Live values carrying a tag. Does not count as access.
    ///
    /// Tagged entries that fail verification or do not decode as `T` are
    /// dropped, as on a keyed read.
    pub fn values_with_tag<T: DeserializeOwned>(&self, tag: &str) -> Vec<T> {
        let now = Utc::now();
        let mut values = Vec::new();
        let mut corrupt: Vec<(String, String)> = Vec::new();

        {
            let entries = self.entries.read();
            for entry in entries
                .values()
                .filter(|e| !e.is_expired(now) && e.tags.iter().any(|t| t == tag))
            {
                let decoded = if entry.verify() {
                    serde_json::from_str(&entry.data).ok()
                } else {
                    None
                };
                match decoded {
                    Some(value) => values.push(value),
                    None => corrupt.push((entry.key.clone(), entry.data_hash.clone())),
                }
            }
        }

        if !corrupt.is_empty() {
            let mut entries = self.entries.write();
            for (key, data_hash) in corrupt {
                // Skip keys rewritten since the read pass
                if entries.get(&key).is_some_and(|e| e.data_hash == data_hash) {
                    warn!("Dropping corrupt cache entry {}", key);
                    entries.remove(&key);
                    self.integrity_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        values
    }

    /// Snapshot of an entry's bookkeeping without touching access stats
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Value scores of all entries as of `now`, ascending
    pub fn value_scores_at(&self, now: DateTime<Utc>) -> Vec<(String, f64)> {
        let mut scores: Vec<_> = self
            .entries
            .read()
            .values()
            .map(|e| (e.key.clone(), e.value_score(now)))
            .collect();
        scores.sort_by(|a, b| a.1.total_cmp(&b.1));
        scores
    }

    /// Eagerly drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let removed = self.remove_where(|entry| entry.is_expired(now));
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            entry_count: self.len(),
        }
    }

    #[cfg(test)]
    fn corrupt(&self, key: &str) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.data.push_str("tampered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IntelligenceType;
    use std::time::Duration as StdDuration;

    fn cache(max_entries: usize) -> IntelCache {
        IntelCache::new(CacheConfig {
            max_entries,
            default_ttl_secs: 3600,
        })
    }

    fn record(confidence: f64) -> ProcessedIntelligence {
        ProcessedIntelligence::builder(IntelligenceType::Trend, "Telehealth adoption")
            .summary("Hospitals expand remote care")
            .confidence(confidence)
            .source("news")
            .entities(vec!["Epic".into()])
            .tags(vec!["healthcare".into()])
            .build()
    }

    #[test]
    fn test_set_and_get() {
        let cache = cache(10);
        cache.set("k", &vec![1, 2, 3], CacheOptions::new()).unwrap();

        let value: Option<Vec<i32>> = cache.get("k");
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert_eq!(cache.entry("k").unwrap().access_count, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_entry_is_lazy_miss() {
        let cache = cache(10);
        let now = Utc::now();
        cache
            .set_at("k", "v", CacheOptions::new().ttl(StdDuration::from_secs(60)), now)
            .unwrap();

        assert!(cache.get_raw_at("k", now + Duration::seconds(30)).is_some());
        assert!(cache.contains("k"));
        assert!(cache.get_raw_at("k", now + Duration::seconds(61)).is_none());
        assert!(!cache.contains("k"));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = cache(20);
        for i in 0..100 {
            cache.set(&format!("k{}", i), &i, CacheOptions::new()).unwrap();
            assert!(cache.len() <= 20);
        }
        assert!(cache.stats().evictions >= 80);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let cache = cache(2);
        cache.set("a", &1, CacheOptions::new()).unwrap();
        cache.set("b", &2, CacheOptions::new()).unwrap();
        cache.set("a", &3, CacheOptions::new()).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get::<i32>("a"), Some(3));
    }

    #[test]
    fn test_evicts_lowest_value_entry() {
        let cache = cache(10);
        let now = Utc::now();

        for i in 0..9 {
            cache
                .set_at(&format!("good{}", i), &i, CacheOptions::new().confidence(0.9), now)
                .unwrap();
        }
        // Old and low confidence: clearly the least valuable
        cache
            .set_at(
                "stale",
                &0,
                CacheOptions::new().confidence(0.1).ttl(StdDuration::from_secs(7 * 86400)),
                now - Duration::hours(48),
            )
            .unwrap();

        let bottom = cache.value_scores_at(now)[0].0.clone();
        assert_eq!(bottom, "stale");

        cache.set_at("new", &1, CacheOptions::new(), now).unwrap();
        assert_eq!(cache.len(), 10);
        assert!(!cache.contains("stale"));
        assert!(cache.contains("new"));
    }

    #[test]
    fn test_frequently_accessed_entries_survive() {
        let cache = cache(10);
        let now = Utc::now();
        for i in 0..10 {
            cache
                .set_at(&format!("k{}", i), &i, CacheOptions::new().confidence(0.5), now)
                .unwrap();
        }
        for i in 1..10 {
            for _ in 0..5 {
                cache.get_raw_at(&format!("k{}", i), now);
            }
        }

        cache.set_at("k10", &10, CacheOptions::new(), now).unwrap();
        assert!(!cache.contains("k0"));
        assert!(cache.contains("k1"));
    }

    #[test]
    fn test_value_score_formula() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "k".into(),
            data: "1".into(),
            created_at: now - Duration::hours(12),
            expires_at: now + Duration::hours(1),
            access_count: 5,
            last_accessed: now,
            tags: vec![],
            confidence: 0.8,
            data_hash: hash_data("1"),
        };
        // 0.3 * 0.5 + 0.4 * 0.5 + 0.3 * 0.8
        assert!((entry.value_score(now) - 0.59).abs() < 1e-6);

        let ancient = CacheEntry {
            created_at: now - Duration::hours(72),
            ..entry
        };
        assert!(ancient.value_score(now) < 0.3 * 0.8 + 0.4 * 0.5);
    }

    #[test]
    fn test_ttl_tiers_monotonic() {
        let base = StdDuration::from_secs(3600);
        assert_eq!(ttl_for_confidence(base, 0.9), StdDuration::from_secs(7200));
        assert_eq!(ttl_for_confidence(base, 0.7), StdDuration::from_secs(3600));
        assert_eq!(ttl_for_confidence(base, 0.5), StdDuration::from_secs(1800));
        assert!(ttl_for_confidence(base, 0.9) > ttl_for_confidence(base, 0.5));
    }

    #[test]
    fn test_cache_with_confidence_ttl() {
        let cache = cache(10);
        let now = Utc::now();
        cache.cache_with_confidence_at("high", &record(0.9), now).unwrap();
        cache.cache_with_confidence_at("low", &record(0.5), now).unwrap();

        let high = cache.entry("high").unwrap();
        let low = cache.entry("low").unwrap();
        assert!(high.expires_at > low.expires_at);
        assert_eq!(high.expires_at - now, Duration::hours(2));
        assert!(high.tags.contains(&INTELLIGENCE_TAG.to_string()));
        assert!(high.tags.contains(&"trend".to_string()));
        assert!(high.tags.contains(&"healthcare".to_string()));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let cache = cache(10);
        let now = Utc::now();
        let original = record(0.9);
        let serialized = serde_json::to_string(&original).unwrap();

        cache.cache_with_confidence_at("r", &original, now).unwrap();

        let raw = cache.get_raw_at("r", now + Duration::minutes(30)).unwrap();
        assert_eq!(raw, serialized);
        let decoded: ProcessedIntelligence = cache.get_at("r", now + Duration::minutes(30)).unwrap();
        assert_eq!(decoded, original);

        assert!(cache.get_raw_at("r", now + Duration::hours(3)).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_dropped() {
        let cache = cache(10);
        cache.set("k", "value", CacheOptions::new()).unwrap();
        cache.corrupt("k");

        assert!(cache.get_raw("k").is_none());
        assert!(!cache.contains("k"));
        assert_eq!(cache.stats().integrity_failures, 1);
    }

    #[test]
    fn test_undecodable_entry_is_dropped() {
        let cache = cache(10);
        cache.set("k", "not a number", CacheOptions::new()).unwrap();

        assert!(cache.get::<u64>("k").is_none());
        assert!(!cache.contains("k"));
    }

    #[test]
    fn test_invalidate_pattern() {
        let cache = cache(10);
        cache.set("analysis:1", &1, CacheOptions::new()).unwrap();
        cache.set("analysis:2", &2, CacheOptions::new()).unwrap();
        cache.set("intel:1", &3, CacheOptions::new()).unwrap();

        assert_eq!(cache.invalidate_pattern("^analysis:").unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert!(matches!(
            cache.invalidate_pattern("(unclosed"),
            Err(CacheError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_invalidate_market_change_over_invalidates() {
        let cache = cache(10);
        cache.cache_with_confidence("r1", &record(0.9)).unwrap();
        cache
            .set("other", "cloud pricing", CacheOptions::new().tags(vec!["aws".into()]))
            .unwrap();
        cache.set("unrelated", "weather", CacheOptions::new()).unwrap();

        let change = MarketChange::new("EHR vendor consolidation", vec!["epic".into(), "AWS".into()]);
        assert_eq!(cache.invalidate_market_change(&change), 2);
        assert!(cache.contains("unrelated"));
    }

    #[test]
    fn test_invalidate_by_tags() {
        let cache = cache(10);
        cache
            .set("a", &1, CacheOptions::new().tags(vec!["fintech".into()]))
            .unwrap();
        cache
            .set("b", &2, CacheOptions::new().tags(vec!["health".into()]))
            .unwrap();

        assert_eq!(cache.invalidate_by_tags(&["fintech".into()]), 1);
        assert!(cache.contains("b"));
    }

    #[test]
    fn test_values_with_tag() {
        let cache = cache(10);
        cache.cache_with_confidence("r1", &record(0.9)).unwrap();
        cache.cache_with_confidence("r2", &record(0.4)).unwrap();
        cache.set("x", &5, CacheOptions::new()).unwrap();

        let records: Vec<ProcessedIntelligence> = cache.values_with_tag(INTELLIGENCE_TAG);
        assert_eq!(records.len(), 2);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_values_with_tag_drops_corrupt_and_undecodable() {
        let cache = cache(10);
        cache.cache_with_confidence("r1", &record(0.9)).unwrap();
        cache.cache_with_confidence("r2", &record(0.7)).unwrap();
        cache.corrupt("r2");
        cache
            .set(
                "stray",
                "not a record",
                CacheOptions::new().tags(vec![INTELLIGENCE_TAG.into()]),
            )
            .unwrap();

        let records: Vec<ProcessedIntelligence> = cache.values_with_tag(INTELLIGENCE_TAG);
        assert_eq!(records.len(), 1);
        assert!(cache.contains("r1"));
        assert!(!cache.contains("r2"));
        assert!(!cache.contains("stray"));
        assert_eq!(cache.stats().integrity_failures, 2);
    }

    #[test]
    fn test_hit_rate() {
        let cache = cache(10);
        cache.set("k", &1, CacheOptions::new()).unwrap();
        cache.get_raw("k");
        cache.get_raw("missing");
        assert_eq!(cache.stats().hit_rate(), 50.0);
    }

    #[test]
    fn test_concurrent_readers_during_eviction() {
        use std::sync::Arc;

        let cache = Arc::new(cache(50));
        for i in 0..50 {
            cache.set(&format!("k{}", i), &i, CacheOptions::new()).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        if t == 0 {
                            cache.set(&format!("w{}", i), &i, CacheOptions::new()).unwrap();
                        } else {
                            let _ = cache.get_raw(&format!("k{}", i % 50));
                        }
                        assert!(cache.len() <= 50);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 50);
    }
}
