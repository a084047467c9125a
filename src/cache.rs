// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Bearer Gate Contributors

//! TTL cache for verified bearer tokens.
//!
//! Maps an identity key (client address or token digest) to the last
//! token verified for it. A hit within the TTL window skips the
//! round-trip to the identity authority. The TTL bounds the window in
//! which a revoked token can still be admitted from cache; that is the
//! deliberate trade-off between verifier load and revocation latency.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Cached entry: verified token + absolute expiry instant.
struct CacheEntry {
    token: String,
    expires_at: Instant,
}

/// In-process TTL cache of verified tokens, keyed by identity key.
///
/// Interior mutability behind a `Mutex`; concurrent requests for the
/// same key may race between lookup and store. Last write wins, and
/// duplicate in-flight verifications at expiry boundaries are accepted
/// because verification is idempotent at the authority.
pub struct TokenCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl TokenCache {
    /// Create a new cache.
    ///
    /// - `capacity`: max number of identity keys held (LRU-bounded).
    /// - `ttl`: trust window for each verified token.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
            ttl,
        }
    }

    /// Check whether `token` is still trusted for `key` at `now`.
    ///
    /// A hit requires all of: an entry exists, its stored token equals
    /// the presented token, and `now` is strictly before the expiry.
    /// On token mismatch or expiry the stale entry is evicted eagerly;
    /// trust is never extended to a different token.
    pub fn lookup(&self, key: &str, token: &str, now: Instant) -> bool {
        let Ok(mut cache) = self.inner.lock() else {
            return false;
        };
        match cache.get(key) {
            Some(entry) if entry.token == token && now < entry.expires_at => true,
            Some(_) => {
                cache.pop(key);
                false
            }
            None => false,
        }
    }

    /// Record `token` as verified for `key`, trusted until `now + ttl`.
    ///
    /// Overwrites any existing entry for the key.
    pub fn store(&self, key: &str, token: &str, now: Instant) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(
                key.to_string(),
                CacheEntry {
                    token: token.to_string(),
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// Number of live entries (expired-but-unevicted included).
    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
