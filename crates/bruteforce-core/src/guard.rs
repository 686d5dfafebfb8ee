//! Per-source-address failure counter
//!
//! Tracks authentication failures per client address and blocks further
//! attempts once the threshold is reached inside the window. The window is
//! anchored at the FIRST failure; once it elapses the record resets.

use crate::config::GuardConfig;
use dashmap::DashMap;
use std::net::IpAddr;
use std::time::Instant;
use tracing::{debug, warn};

/// Failure-rate guard with per-address windowed counters
#[derive(Debug)]
pub struct FailureGuard {
    config: GuardConfig,
    records: DashMap<IpAddr, FailureRecord>,
}

/// Failure count within the current window
#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    count: u32,
    window_start: Instant,
}

impl FailureGuard {
    /// Create a new guard with the given configuration
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    /// Check whether an address is currently blocked
    ///
    /// True iff the address has an active record whose failure count reached
    /// the threshold and whose window has not yet elapsed. A record whose
    /// window has elapsed is removed here; there is no background sweep.
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.is_blocked_at(addr, Instant::now())
    }

    /// Record one authentication failure for an address
    ///
    /// The first failure (or the first after an elapsed window) restarts the
    /// window; failures inside the window increment the counter in place.
    pub fn record_failure(&self, addr: IpAddr) {
        if !self.config.enabled {
            return;
        }
        self.record_failure_at(addr, Instant::now());
    }

    fn is_blocked_at(&self, addr: IpAddr, now: Instant) -> bool {
        let record = match self.records.get(&addr).map(|r| *r) {
            Some(r) => r,
            None => return false,
        };

        if now.duration_since(record.window_start) >= self.config.window() {
            self.records.remove(&addr);
            return false;
        }

        let blocked = record.count >= self.config.max_failures;
        if blocked {
            warn!(address = %addr, count = record.count, "Address is blocked");
        }
        blocked
    }

    fn record_failure_at(&self, addr: IpAddr, now: Instant) {
        let mut entry = self.records.entry(addr).or_insert(FailureRecord {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.config.window() {
            entry.count = 1;
            entry.window_start = now;
        } else {
            entry.count += 1;
        }
        let count = entry.count;
        drop(entry);

        debug!(address = %addr, count, "Recorded authentication failure");
        if count >= self.config.max_failures {
            warn!(
                address = %addr,
                count,
                max_failures = self.config.max_failures,
                "Failure threshold reached, blocking address"
            );
        }
    }

    /// Number of addresses currently tracked (for monitoring)
    pub fn tracked_addresses(&self) -> usize {
        self.records.len()
    }

    /// Remove records whose window has elapsed to bound memory growth
    pub fn evict_expired(&self) {
        let now = Instant::now();
        let window = self.config.window();
        self.records
            .retain(|_, record| now.duration_since(record.window_start) < window);
    }

    /// Get a reference to the config
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}
