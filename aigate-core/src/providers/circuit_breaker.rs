//! Per-provider circuit breaker
//!
//! ```text
//! CLOSED ──[consecutive failures >= threshold]──► OPEN
//!   ▲                                              │
//!   │                                      [cool-down elapsed]
//!   │                                              ▼
//!   └───────────[trial succeeds]──────────── HALF-OPEN
//!                                                  │
//!                 OPEN ◄──────[trial fails]────────┘
//! ```
//!
//! Each provider has its own entry in a sharded map, so a failing provider
//! never blocks bookkeeping for a healthy one. A half-open circuit lets
//! exactly one trial call through at a time.

use crate::clock::{seconds, SharedClock};
use crate::config::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::providers::adapter::ProviderKind;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    #[default]
    Closed,
    /// Failing fast; no calls reach the provider
    Open,
    /// One trial call allowed
    HalfOpen,
}

/// Health snapshot of one provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct BreakerEntry {
    health: ProviderHealth,
    /// Set while the half-open trial call is outstanding
    trial_started_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    enabled: bool,
    clock: SharedClock,
    entries: DashMap<ProviderKind, BreakerEntry>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            enabled: true,
            clock,
            entries: DashMap::new(),
        }
    }

    /// A disabled breaker allows every call and records nothing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn cool_down(&self) -> Duration {
        seconds(self.config.cool_down_secs)
    }

    /// Apply the time-driven Open -> HalfOpen transition
    fn refresh(&self, provider: ProviderKind, entry: &mut BreakerEntry, now: DateTime<Utc>) {
        if entry.health.state != CircuitState::Open {
            return;
        }
        let cooled = entry
            .health
            .opened_at
            .is_none_or(|opened| now - opened >= self.cool_down());
        if cooled {
            entry.health.state = CircuitState::HalfOpen;
            entry.trial_started_at = None;
            info!(%provider, "Circuit breaker half-open");
        }
    }

    /// Gate an attempt. Must be called before every attempt, retries included.
    pub fn before_call(&self, provider: ProviderKind) -> Result<(), GatewayError> {
        if !self.enabled {
            return Ok(());
        }

        let now = self.clock.now();
        let mut entry = self.entries.entry(provider).or_default();
        self.refresh(provider, &mut entry, now);

        match entry.health.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                debug!(%provider, "Call rejected by open circuit");
                Err(GatewayError::CircuitOpen { provider })
            }
            CircuitState::HalfOpen => {
                // An abandoned trial (caller cancelled before reporting) is
                // released after one cool-down period.
                let trial_pending = entry
                    .trial_started_at
                    .is_some_and(|started| now - started < self.cool_down());
                if trial_pending {
                    debug!(%provider, "Half-open trial already in flight");
                    Err(GatewayError::CircuitOpen { provider })
                } else {
                    entry.trial_started_at = Some(now);
                    Ok(())
                }
            }
        }
    }

    /// Report the outcome of an attempt admitted by [`Self::before_call`]
    pub fn record_result(&self, provider: ProviderKind, success: bool) {
        if !self.enabled {
            return;
        }

        let now = self.clock.now();
        let mut guard = self.entries.entry(provider).or_default();
        let entry = &mut *guard;
        let health = &mut entry.health;

        match (health.state, success) {
            (CircuitState::Closed, true) => {
                health.consecutive_failures = 0;
            }
            (CircuitState::Closed, false) => {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                if health.consecutive_failures >= self.config.failure_threshold {
                    health.state = CircuitState::Open;
                    health.opened_at = Some(now);
                    warn!(
                        %provider,
                        failures = health.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            (CircuitState::HalfOpen, true) => {
                health.state = CircuitState::Closed;
                health.consecutive_failures = 0;
                health.opened_at = None;
                entry.trial_started_at = None;
                info!(%provider, "Circuit breaker closed");
            }
            (CircuitState::HalfOpen, false) => {
                health.state = CircuitState::Open;
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                health.opened_at = Some(now);
                entry.trial_started_at = None;
                warn!(%provider, "Half-open trial failed, circuit re-opened");
            }
            // Late results from calls admitted before the circuit opened
            (CircuitState::Open, true) => {}
            (CircuitState::Open, false) => {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
            }
        }
    }

    /// Abandon an admitted attempt without judging the provider.
    ///
    /// Frees the half-open trial slot so the next caller may try; failure
    /// counts are left alone.
    pub fn release_trial(&self, provider: ProviderKind) {
        if !self.enabled {
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(&provider) {
            if entry.health.state == CircuitState::HalfOpen && entry.trial_started_at.is_some() {
                entry.trial_started_at = None;
                debug!(%provider, "Half-open trial released unjudged");
            }
        }
    }

    /// Current state, with any elapsed cool-down applied
    pub fn state(&self, provider: ProviderKind) -> CircuitState {
        self.health(provider).state
    }

    /// Whether a call to this provider would currently be admitted
    pub fn is_available(&self, provider: ProviderKind) -> bool {
        if !self.enabled {
            return true;
        }
        let now = self.clock.now();
        let mut entry = self.entries.entry(provider).or_default();
        self.refresh(provider, &mut entry, now);
        match entry.health.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => entry
                .trial_started_at
                .is_none_or(|started| now - started >= self.cool_down()),
        }
    }

    pub fn health(&self, provider: ProviderKind) -> ProviderHealth {
        if !self.enabled {
            return ProviderHealth::default();
        }
        let now = self.clock.now();
        let mut entry = self.entries.entry(provider).or_default();
        self.refresh(provider, &mut entry, now);
        entry.health.clone()
    }

    /// Health of the given providers
    pub fn snapshot(
        &self,
        providers: impl IntoIterator<Item = ProviderKind>,
    ) -> BTreeMap<ProviderKind, ProviderHealth> {
        providers
            .into_iter()
            .map(|provider| (provider, self.health(provider)))
            .collect()
    }

    /// Operator override: force the circuit closed
    pub fn reset(&self, provider: ProviderKind) {
        self.entries.insert(provider, BreakerEntry::default());
        info!(%provider, "Circuit breaker reset");
    }
}
