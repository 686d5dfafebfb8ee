//! In-memory TTL cache for validated credentials and fetched group sets
//!
//! Reduces directory round-trips under a trust window the operator accepts
//! as a staleness/availability trade-off. All state is process-local; expiry
//! is checked at read time, there is no background sweep, and entries are
//! overwritten (never merged) on refresh.

use crate::matching;
use crate::policy::Conditional;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Matching settings a group entry was written under
///
/// A cached group set is only trusted when read under the same settings it
/// was stored with; anything else is a miss, never a deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub case_sensitive: bool,
    pub conditional: Conditional,
}

#[derive(Debug, Clone)]
struct GroupEntry {
    raw_groups: Vec<String>,
    inserted: Instant,
    settings: CacheSettings,
}

#[derive(Debug)]
struct CacheInner {
    credentials: HashMap<String, Instant>,
    groups: HashMap<String, GroupEntry>,
}

/// Thread-safe decision cache with a single TTL for both entry types
#[derive(Debug)]
pub struct DecisionCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl DecisionCache {
    /// Create an empty cache whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                credentials: HashMap::new(),
                groups: HashMap::new(),
            }),
            ttl,
        }
    }

    /// True iff an unexpired entry exists for exactly this credential pair
    pub fn check_credential(&self, username: &str, password: &str) -> bool {
        let key = credential_key(username, password);
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.credentials.get(&key) {
            Some(inserted) if now.duration_since(*inserted) < self.ttl => {
                debug!(username, "Credential cache hit");
                true
            }
            Some(_) => {
                inner.credentials.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Store a fresh valid entry for the credential pair; always overwrites
    pub fn record_credential(&self, username: &str, password: &str) {
        let key = credential_key(username, password);
        self.inner.lock().credentials.insert(key, Instant::now());
    }

    /// Evaluate the requested patterns against the cached raw group list
    ///
    /// `settings` come from the calling request's own policy; the shared
    /// cache never holds current settings, so a concurrent request with a
    /// different policy cannot change how this one evaluates. `None` is a
    /// cache miss (no entry, expired entry, or an entry written under
    /// different settings) and tells the orchestrator to fall back to the
    /// directory. `Some` re-runs the same matching logic the directory
    /// client uses.
    pub fn check_groups(
        &self,
        username: &str,
        requested: &[String],
        settings: CacheSettings,
    ) -> Option<(bool, Vec<String>)> {
        let now = Instant::now();
        let raw_groups = {
            let mut inner = self.inner.lock();
            let entry = inner.groups.get(username)?.clone();
            if now.duration_since(entry.inserted) >= self.ttl {
                inner.groups.remove(username);
                return None;
            }
            if entry.settings != settings {
                debug!(
                    username,
                    "Group cache entry written under different settings, treating as miss"
                );
                return None;
            }
            entry.raw_groups
        };

        debug!(username, "Group cache hit");
        let eval = matching::evaluate_groups(
            username,
            requested,
            &raw_groups,
            settings.conditional,
            settings.case_sensitive,
        );
        Some((eval.ok, eval.matched_groups))
    }

    /// Store the raw group list under the writing request's settings
    pub fn record_groups(&self, username: &str, raw_groups: Vec<String>, settings: CacheSettings) {
        let mut inner = self.inner.lock();
        inner.groups.insert(
            username.to_string(),
            GroupEntry {
                raw_groups,
                inserted: Instant::now(),
                settings,
            },
        );
    }

    /// Number of stored entries, including expired ones not yet evicted
    /// (expiry happens at read time or via `evict_expired`)
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.credentials.len() + inner.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all expired entries
    pub fn evict_expired(&self) {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut inner = self.inner.lock();
        inner
            .credentials
            .retain(|_, inserted| now.duration_since(*inserted) < ttl);
        inner
            .groups
            .retain(|_, entry| now.duration_since(entry.inserted) < ttl);
    }
}

/// Compute SHA-256 of the credential pair, returned as lowercase hex
///
/// Credentials are hashed before use as cache keys so the raw password never
/// sits in the cache.
fn credential_key(username: &str, password: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    let out = hasher.finalize();
    base16ct::lower::encode_string(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CacheSettings {
        CacheSettings {
            case_sensitive: false,
            conditional: Conditional::And,
        }
    }

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_credential_roundtrip() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        assert!(!cache.check_credential("alice", "pw"));

        cache.record_credential("alice", "pw");
        assert!(cache.check_credential("alice", "pw"));

        // Exact pair only
        assert!(!cache.check_credential("alice", "other"));
        assert!(!cache.check_credential("bob", "pw"));
    }

    #[test]
    fn test_credential_expiry() {
        let cache = DecisionCache::new(Duration::from_millis(1));
        cache.record_credential("alice", "pw");
        std::thread::sleep(Duration::from_millis(5));
        assert!(!cache.check_credential("alice", "pw"));
        // Expired entry is dropped at read time
        assert!(cache.is_empty());
    }

    #[test]
    fn test_group_hit_reruns_matching() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.record_groups(
            "alice",
            strs(&["CN=Admins,OU=Groups", "CN=Users,OU=Groups"]),
            settings(),
        );

        let (ok, matched) = cache
            .check_groups("alice", &strs(&["Admins"]), settings())
            .unwrap();
        assert!(ok);
        assert_eq!(matched, vec!["Admins".to_string()]);

        // Same cached raw list, different patterns, different verdict
        let (ok, matched) = cache
            .check_groups("alice", &strs(&["Finance"]), settings())
            .unwrap();
        assert!(!ok);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_group_miss_without_entry() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        assert!(cache
            .check_groups("alice", &strs(&["Admins"]), settings())
            .is_none());
    }

    #[test]
    fn test_group_read_under_other_settings_is_a_miss() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.record_groups("alice", strs(&["CN=Admins,OU=Groups"]), settings());
        assert!(cache
            .check_groups("alice", &strs(&["admins"]), settings())
            .is_some());

        // Different case sensitivity: the entry is invisible, never a deny
        // and never a wrong verdict
        let strict = CacheSettings {
            case_sensitive: true,
            conditional: Conditional::And,
        };
        assert!(cache
            .check_groups("alice", &strs(&["admins"]), strict)
            .is_none());
        assert_eq!(cache.len(), 1);

        // A reader with the original settings still sees the entry
        assert!(cache
            .check_groups("alice", &strs(&["admins"]), settings())
            .is_some());
    }

    #[test]
    fn test_concurrent_policies_evaluate_with_their_own_settings() {
        // Two requests with different policies share the cache; each must
        // evaluate a hit under the settings of its own policy, regardless of
        // what the other recorded or read in between.
        let cache = DecisionCache::new(Duration::from_secs(60));
        let relaxed = CacheSettings {
            case_sensitive: false,
            conditional: Conditional::Or,
        };
        let strict = CacheSettings {
            case_sensitive: true,
            conditional: Conditional::And,
        };
        cache.record_groups("alice", strs(&["CN=Admins,OU=Groups"]), relaxed);

        // The strict request must not get the relaxed entry evaluated on
        // its behalf: pattern "admins" would wrongly match CN=Admins there
        assert!(cache
            .check_groups("alice", &strs(&["admins"]), strict)
            .is_none());

        let (ok, matched) = cache
            .check_groups("alice", &strs(&["admins"]), relaxed)
            .unwrap();
        assert!(ok);
        assert_eq!(matched, vec!["Admins".to_string()]);
    }

    #[test]
    fn test_group_expiry() {
        let cache = DecisionCache::new(Duration::from_millis(1));
        cache.record_groups("alice", strs(&["CN=Admins,OU=Groups"]), settings());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache
            .check_groups("alice", &strs(&["Admins"]), settings())
            .is_none());
    }

    #[test]
    fn test_record_overwrites() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        cache.record_groups("alice", strs(&["CN=Admins,OU=Groups"]), settings());
        cache.record_groups("alice", strs(&["CN=Finance,OU=Groups"]), settings());

        let (ok, _) = cache
            .check_groups("alice", &strs(&["Admins"]), settings())
            .unwrap();
        assert!(!ok);
        let (ok, _) = cache
            .check_groups("alice", &strs(&["Finance"]), settings())
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_len_counts_unevicted_entries() {
        let cache = DecisionCache::new(Duration::from_millis(1));
        cache.record_credential("alice", "pw");
        std::thread::sleep(Duration::from_millis(5));

        // Expired entries stay counted until a read or a sweep drops them
        assert_eq!(cache.len(), 1);
        cache.evict_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_expired() {
        let cache = DecisionCache::new(Duration::from_millis(1));
        cache.record_credential("alice", "pw");
        cache.record_groups("alice", strs(&["CN=Admins,OU=Groups"]), settings());
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(5));
        cache.evict_expired();
        assert!(cache.is_empty());
    }
}
