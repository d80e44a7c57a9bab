//! Query Result Cache
//!
//! Bounded TTL + LRU map over contextual search results. The key embeds the
//! user scope, the sector set, a hash of the query text, and k; a missing
//! user component would leak one tenant's results into another's cache
//! hits, so the scope is baked into the key type and cannot be omitted.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::memory::{SearchResponse, Sector};

/// Maximum cached entries.
const CACHE_CAPACITY: usize = 256;

/// Key component used for unscoped (all-tenant) queries; distinct from any
/// real user id and from the anonymous sentinel.
const UNSCOPED: &str = "\u{1}unscoped";

// ============================================================================
// KEY
// ============================================================================

/// Cache key: (user scope, sorted sector set, query hash, k).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scope: String,
    sectors: Vec<Sector>,
    query_hash: [u8; 32],
    k: usize,
}

impl CacheKey {
    pub fn new(user: Option<&str>, sectors: Option<&[Sector]>, query: &str, k: usize) -> Self {
        let mut sorted: Vec<Sector> = sectors.map(|s| s.to_vec()).unwrap_or_default();
        sorted.sort();
        sorted.dedup();
        Self {
            scope: user.map(|u| u.to_string()).unwrap_or_else(|| UNSCOPED.to_string()),
            sectors: sorted,
            query_hash: Sha256::digest(query.as_bytes()).into(),
            k,
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

struct Entry {
    stored_at: Instant,
    response: SearchResponse,
}

/// TTL-bounded LRU cache for search responses.
pub struct QueryCache {
    inner: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Duration,
    enabled: bool,
}

impl QueryCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            // SAFETY: CACHE_CAPACITY is a non-zero constant.
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            ttl,
            enabled,
        }
    }

    /// Fresh cached response, if any. Expired entries are evicted on read.
    pub fn get(&self, key: &CacheKey) -> Option<SearchResponse> {
        if !self.enabled {
            return None;
        }
        let mut cache = self.inner.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                tracing::debug!("query cache hit");
                Some(entry.response.clone())
            }
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: CacheKey, response: SearchResponse) {
        if !self.enabled {
            return;
        }
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(
                key,
                Entry {
                    stored_at: Instant::now(),
                    response,
                },
            );
        }
    }

    /// Drop everything; used after writes that invalidate results (wipe,
    /// delete).
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn response(n: usize) -> SearchResponse {
        SearchResponse {
            hits: Vec::with_capacity(n),
            degraded: false,
        }
    }

    #[test]
    fn test_key_separates_users() {
        let alice = CacheKey::new(Some("alice"), None, "programming", 10);
        let bob = CacheKey::new(Some("bob"), None, "programming", 10);
        let unscoped = CacheKey::new(None, None, "programming", 10);
        assert_ne!(alice, bob);
        assert_ne!(alice, unscoped);
        assert_ne!(bob, unscoped);
    }

    #[test]
    fn test_key_sector_order_irrelevant() {
        let a = CacheKey::new(
            Some("alice"),
            Some(&[Sector::Semantic, Sector::Episodic]),
            "q",
            5,
        );
        let b = CacheKey::new(
            Some("alice"),
            Some(&[Sector::Episodic, Sector::Semantic]),
            "q",
            5,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = QueryCache::new(true, Duration::from_secs(60));
        let key = CacheKey::new(Some("alice"), None, "q", 10);

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), response(0));
        assert!(cache.get(&key).is_some());

        // A different user never hits the same entry.
        let other = CacheKey::new(Some("bob"), None, "q", 10);
        assert!(cache.get(&other).is_none());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = QueryCache::new(true, Duration::from_millis(0));
        let key = CacheKey::new(Some("alice"), None, "q", 10);
        cache.put(key.clone(), response(0));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_disabled_never_caches() {
        let cache = QueryCache::new(false, Duration::from_secs(60));
        let key = CacheKey::new(Some("alice"), None, "q", 10);
        cache.put(key.clone(), response(0));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_clear() {
        let cache = QueryCache::new(true, Duration::from_secs(60));
        let key = CacheKey::new(Some("alice"), None, "q", 10);
        cache.put(key.clone(), response(0));
        cache.clear();
        assert!(cache.get(&key).is_none());
    }
}
