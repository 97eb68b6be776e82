//! Usage accounting
//!
//! Every gateway call produces exactly one [`UsageRecord`], whatever its
//! outcome. Records are append-only per tenant and aggregated on demand.

use crate::clock::SharedClock;
use crate::protocol::types::TenantId;
use crate::providers::adapter::ProviderKind;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageOutcome {
    Success,
    Error,
    RateLimited,
    BudgetExceeded,
    CircuitOpen,
}

impl fmt::Display for UsageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::RateLimited => "rateLimited",
            Self::BudgetExceeded => "budgetExceeded",
            Self::CircuitOpen => "circuitOpen",
        };
        f.pad(name)
    }
}

/// One gateway call as seen by accounting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: Uuid,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    /// Absent when the call was rejected before a provider was chosen
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub tokens: u32,
    pub cost_cents: f64,
    pub latency_ms: u64,
    pub outcome: UsageOutcome,
}

/// Aggregate over a set of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_cost_cents: f64,
    /// Successful share of all requests; 0.0 when there are none
    pub success_rate: f64,
    pub total_tokens: u64,
    pub average_latency_ms: f64,
    pub by_outcome: BTreeMap<UsageOutcome, u64>,
}

impl UsageStats {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut stats = UsageStats::default();
        let mut latency_sum: u128 = 0;

        for record in records {
            stats.total_requests += 1;
            stats.total_cost_cents += record.cost_cents;
            stats.total_tokens += u64::from(record.tokens);
            latency_sum += u128::from(record.latency_ms);
            *stats.by_outcome.entry(record.outcome).or_insert(0) += 1;
        }

        if stats.total_requests > 0 {
            let successes = stats
                .by_outcome
                .get(&UsageOutcome::Success)
                .copied()
                .unwrap_or(0);
            stats.success_rate = successes as f64 / stats.total_requests as f64;
            stats.average_latency_ms = latency_sum as f64 / stats.total_requests as f64;
        }
        stats
    }

    pub fn count(&self, outcome: UsageOutcome) -> u64 {
        self.by_outcome.get(&outcome).copied().unwrap_or(0)
    }
}

/// Fields of a record supplied by the caller; the tracker stamps the time
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    pub request_id: Uuid,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub tokens: u32,
    pub cost_cents: f64,
    pub latency_ms: u64,
    pub outcome: UsageOutcome,
}

impl UsageEntry {
    /// Entry for a call that never reached a provider
    pub fn rejected(request_id: Uuid, outcome: UsageOutcome) -> Self {
        Self {
            request_id,
            provider: None,
            model: None,
            tokens: 0,
            cost_cents: 0.0,
            latency_ms: 0,
            outcome,
        }
    }
}

pub struct UsageTracker {
    clock: SharedClock,
    enabled: bool,
    records: DashMap<TenantId, Vec<UsageRecord>>,
}

impl UsageTracker {
    pub fn new(clock: SharedClock, enabled: bool) -> Self {
        Self {
            clock,
            enabled,
            records: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a record for the tenant
    pub fn record(&self, tenant: &TenantId, entry: UsageEntry) {
        if !self.enabled {
            return;
        }
        let record = UsageRecord {
            request_id: entry.request_id,
            tenant_id: tenant.clone(),
            timestamp: self.clock.now(),
            provider: entry.provider,
            model: entry.model,
            tokens: entry.tokens,
            cost_cents: entry.cost_cents.max(0.0),
            latency_ms: entry.latency_ms,
            outcome: entry.outcome,
        };
        self.records.entry(tenant.clone()).or_default().push(record);
    }

    /// The tenant's records in insertion order
    pub fn records(&self, tenant: &TenantId) -> Vec<UsageRecord> {
        self.records
            .get(tenant)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn get_usage_stats(&self, tenant: &TenantId) -> UsageStats {
        match self.records.get(tenant) {
            Some(records) => UsageStats::from_records(records.iter()),
            None => UsageStats::default(),
        }
    }

    /// Aggregate over every tenant
    pub fn global_stats(&self) -> UsageStats {
        let snapshot: Vec<UsageRecord> = self
            .records
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        UsageStats::from_records(snapshot.iter())
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.records.iter().map(|e| e.key().clone()).collect();
        tenants.sort();
        tenants
    }
}
