use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::Method;

use crate::error::ApiError;

/// Quota
///
/// Allowance for one HTTP method: at most `limit` calls within any single
/// `window`.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

/// ThrottleConfig
///
/// The per-method quota table. One limiter instance carries the whole table
/// rather than one instance per method, so every method shares the same
/// atomic-update discipline. Methods with no entry are never throttled.
#[derive(Debug, Clone, Default)]
pub struct ThrottleConfig {
    quotas: HashMap<Method, Quota>,
}

impl ThrottleConfig {
    pub fn new() -> Self {
        Self {
            quotas: HashMap::new(),
        }
    }

    pub fn with(mut self, method: Method, limit: u32, window: Duration) -> Self {
        self.quotas.insert(method, Quota { limit, window });
        self
    }

    pub fn quota(&self, method: &Method) -> Option<Quota> {
        self.quotas.get(method).copied()
    }

    /// Production quotas for the composed-maps resource: generous read
    /// allowance, a much tighter write allowance on a shorter window.
    pub fn maps_defaults() -> Self {
        Self::new()
            .with(Method::GET, 600, Duration::from_secs(3600))
            .with(Method::PUT, 600, Duration::from_secs(3600))
            .with(Method::POST, 3, Duration::from_secs(60))
    }
}

/// Bucket state for one `(identifier, method)` pair. Created lazily on the
/// first recorded call; a bucket whose window has elapsed counts as empty.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// RateLimiter
///
/// Tracks per-identifier call counts in rolling windows, keyed independently
/// per HTTP method. This is the only stateful shared component in the query
/// core: the bucket map lives behind a mutex, and `check_and_record` holds
/// it across the read-compare-increment so two concurrent requests can never
/// both observe a stale under-limit count and both pass.
///
/// The identifier is the requester's opaque rate key; the limiter never
/// inspects it.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: ThrottleConfig,
    buckets: Mutex<HashMap<(String, Method), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// True iff a call for `(identifier, method)` at `now` would exceed the
    /// method's quota. A missing bucket or an elapsed window counts as zero
    /// calls so far. Read-only: the decision does not consume quota.
    pub fn should_throttle(&self, identifier: &str, method: &Method, now: Instant) -> bool {
        let Some(quota) = self.config.quota(method) else {
            return false;
        };

        let buckets = self.buckets.lock().expect("quota bucket lock poisoned");
        match buckets.get(&(identifier.to_string(), method.clone())) {
            Some(bucket) if now.duration_since(bucket.window_start) < quota.window => {
                bucket.count >= quota.limit
            }
            _ => false,
        }
    }

    /// Accounts one permitted call. Opens a fresh window when none exists or
    /// the current one has elapsed. Callers invoke this only after the
    /// operation is allowed to proceed; rejected calls are not recorded, so
    /// a throttled client cannot lock itself out further by retrying.
    pub fn record_call(&self, identifier: &str, method: &Method, now: Instant) {
        let Some(quota) = self.config.quota(method) else {
            return;
        };

        let mut buckets = self.buckets.lock().expect("quota bucket lock poisoned");
        let bucket = buckets
            .entry((identifier.to_string(), method.clone()))
            .or_insert(Bucket {
                count: 0,
                window_start: now,
            });

        if now.duration_since(bucket.window_start) >= quota.window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
    }

    /// The combined check-then-increment, atomic per key under the bucket
    /// lock. Handlers call this between the policy decision and the storage
    /// operation; on rejection the error carries the seconds left in the
    /// offending window so the response can say when retrying will help.
    pub fn check_and_record(
        &self,
        identifier: &str,
        method: &Method,
        now: Instant,
    ) -> Result<(), ApiError> {
        let Some(quota) = self.config.quota(method) else {
            return Ok(());
        };

        let mut buckets = self.buckets.lock().expect("quota bucket lock poisoned");
        let bucket = buckets
            .entry((identifier.to_string(), method.clone()))
            .or_insert(Bucket {
                count: 0,
                window_start: now,
            });

        if now.duration_since(bucket.window_start) >= quota.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= quota.limit {
            let elapsed = now.duration_since(bucket.window_start);
            let remaining = quota.window.saturating_sub(elapsed);
            return Err(ApiError::Throttled {
                retry_after_secs: retry_after_ceil(remaining),
            });
        }

        bucket.count += 1;
        Ok(())
    }
}

/// Rounds a remaining-window duration up to whole seconds, so a client that
/// honors `Retry-After` never comes back inside the same window.
fn retry_after_ceil(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
}
