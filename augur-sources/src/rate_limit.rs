//! Sliding-window rate limiting
//!
//! Each key keeps the timestamps of its calls inside the window. A call is
//! allowed while fewer than `limit` timestamps remain after pruning. Callers
//! that are refused skip the work; nothing here blocks or waits.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    calls: DashMap<String, VecDeque<DateTime<Utc>>>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::hourly()
    }
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            calls: DashMap::new(),
        }
    }

    /// Limiter with a one-hour window
    pub fn hourly() -> Self {
        Self::new(Duration::hours(1))
    }

    /// Reserve one call for `key` if the window has room
    pub fn try_acquire(&self, key: &str, limit: u32) -> bool {
        self.try_acquire_at(key, limit, Utc::now())
    }

    pub fn try_acquire_at(&self, key: &str, limit: u32, now: DateTime<Utc>) -> bool {
        let mut calls = self.calls.entry(key.to_string()).or_default();
        Self::prune(&mut calls, now - self.window);

        if calls.len() >= limit as usize {
            return false;
        }
        calls.push_back(now);
        true
    }

    /// Give back the most recent reservation for `key`
    pub fn release(&self, key: &str) {
        if let Some(mut calls) = self.calls.get_mut(key) {
            calls.pop_back();
        }
    }

    /// Calls still allowed in the current window
    pub fn remaining(&self, key: &str, limit: u32) -> u32 {
        self.remaining_at(key, limit, Utc::now())
    }

    pub fn remaining_at(&self, key: &str, limit: u32, now: DateTime<Utc>) -> u32 {
        let cutoff = now - self.window;
        let used = self
            .calls
            .get(key)
            .map_or(0, |calls| calls.iter().filter(|t| **t > cutoff).count());
        limit.saturating_sub(used as u32)
    }

    fn prune(calls: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
        while calls.front().is_some_and(|t| *t <= cutoff) {
            calls.pop_front();
        }
    }
}
