//! Per-tenant fixed-window rate limiting

use crate::clock::{seconds, SharedClock};
use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::protocol::types::TenantId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

/// Counter for one tenant's current window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitWindow {
    fn new(now: DateTime<Utc>, limit: u32, window_secs: u64) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit,
            window_secs,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= seconds(self.window_secs)
    }

    /// Whole seconds until the window resets, never less than one
    fn retry_after_seconds(&self, now: DateTime<Utc>) -> u64 {
        let elapsed_ms = u64::try_from((now - self.window_start).num_milliseconds()).unwrap_or(0);
        let remaining_ms = self
            .window_secs
            .saturating_mul(1000)
            .saturating_sub(elapsed_ms);
        remaining_ms.div_ceil(1000).max(1)
    }
}

/// Admission gate bounding each tenant's request rate
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
    windows: DashMap<TenantId, RateLimitWindow>,
    /// Millisecond timestamp of the last sweep of expired windows
    swept_at_ms: AtomicI64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        let swept_at_ms = AtomicI64::new(clock.now().timestamp_millis());
        Self {
            config,
            clock,
            windows: DashMap::new(),
            swept_at_ms,
        }
    }

    /// Count one request against the tenant's window.
    ///
    /// The tenant's entry stays locked for the whole read-modify-write, so
    /// concurrent admits can never both take the last slot.
    pub fn admit(&self, tenant: &TenantId) -> Result<(), GatewayError> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = self.clock.now();
        self.sweep_if_due(now);

        let mut window = self.windows.entry(tenant.clone()).or_insert_with(|| {
            RateLimitWindow::new(now, self.config.requests_per_window, self.config.window_secs)
        });

        if window.is_expired(now) {
            window.window_start = now;
            window.count = 0;
        }

        window.count = window.count.saturating_add(1);
        if window.count > window.limit {
            let retry_after_seconds = window.retry_after_seconds(now);
            warn!(%tenant, count = window.count, limit = window.limit, retry_after_seconds, "Rate limit exceeded");
            return Err(GatewayError::RateLimitExceeded {
                retry_after_seconds,
            });
        }

        Ok(())
    }

    /// Requests the tenant may still make in the current window
    pub fn remaining(&self, tenant: &TenantId) -> u32 {
        let now = self.clock.now();
        match self.windows.get(tenant) {
            Some(window) if !window.is_expired(now) => window.limit.saturating_sub(window.count),
            _ => self.config.requests_per_window,
        }
    }

    /// Snapshot of the tenant's window, if one exists
    pub fn window(&self, tenant: &TenantId) -> Option<RateLimitWindow> {
        self.windows.get(tenant).map(|w| w.clone())
    }

    /// Number of tenants with a window held in memory
    pub fn tracked_tenants(&self) -> usize {
        self.windows.len()
    }

    /// Forget every window that has run its course
    pub fn evict_expired(&self) {
        let now = self.clock.now();
        self.windows.retain(|_, window| !window.is_expired(now));
    }

    /// Evict at most once per window length, from whichever admit gets there first
    fn sweep_if_due(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let interval_ms = i64::try_from(self.config.window_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let last = self.swept_at_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) >= interval_ms
            && self
                .swept_at_ms
                .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            let before = self.windows.len();
            self.windows.retain(|_, window| !window.is_expired(now));
            debug!(evicted = before.saturating_sub(self.windows.len()), "Swept expired rate limit windows");
        }
    }
}
