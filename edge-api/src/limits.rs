//! Per-device rate limiting and envelope replay detection

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct RateLimitBucket {
    tokens: f64,
    last_update: Instant,
    max_tokens: f64,
    refill_rate: f64,
}

impl RateLimitBucket {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_update: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    pub fn try_consume(&mut self, tokens: f64) -> bool {
        self.try_consume_at(tokens, Instant::now())
    }

    fn try_consume_at(&mut self, tokens: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_update = now;

        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    /// True once the bucket has refilled to capacity, i.e. it is
    /// indistinguishable from a fresh one.
    fn is_full_at(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * self.refill_rate >= self.max_tokens
    }
}

/// How often refilled buckets are swept out of a [`RateLimiter`]
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Token buckets keyed by device id. Buckets that have refilled completely
/// are dropped, so the map only holds recently active devices.
#[derive(Debug)]
pub struct RateLimiter {
    burst: u32,
    refill_rate: f64,
    buckets: HashMap<String, RateLimitBucket>,
    last_sweep: Instant,
}

impl RateLimiter {
    /// A burst of 0 disables limiting.
    pub fn new(burst: u32, refill_rate: f64) -> Self {
        Self {
            burst,
            refill_rate,
            buckets: HashMap::new(),
            last_sweep: Instant::now(),
        }
    }

    /// Take one token for `key`; false when its bucket is empty.
    pub fn check(&mut self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &str, now: Instant) -> bool {
        if self.burst == 0 {
            return true;
        }

        if now.saturating_duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.buckets.retain(|_, bucket| !bucket.is_full_at(now));
            self.last_sweep = now;
        }

        let (burst, refill_rate) = (f64::from(self.burst), self.refill_rate);
        let bucket = self.buckets.entry(key.to_string()).or_insert_with(|| {
            let mut bucket = RateLimitBucket::new(burst, refill_rate);
            bucket.last_update = now;
            bucket
        });
        bucket.try_consume_at(1.0, now)
    }

    /// Number of devices currently tracked
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// SHA-256 digests of recently seen envelope bodies
#[derive(Debug)]
pub struct ReplayCache {
    ttl: Duration,
    seen: HashMap<[u8; 32], Instant>,
}

impl ReplayCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Record `body`; false when it was already seen within the TTL.
    pub fn check_and_insert(&mut self, body: &[u8]) -> bool {
        self.check_and_insert_at(body, Instant::now())
    }

    fn check_and_insert_at(&mut self, body: &[u8], now: Instant) -> bool {
        if self.ttl.is_zero() {
            return true;
        }

        let ttl = self.ttl;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < ttl);

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(body));
        if self.seen.contains_key(&digest) {
            return false;
        }
        self.seen.insert(digest, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
