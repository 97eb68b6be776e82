//! Spend control
//!
//! Two guards share one tier table:
//!
//! - [`BudgetGuard::assert_budget`] is stateless and rejects any single call
//!   whose estimate exceeds the tier's per-request ceiling.
//! - [`BudgetGuard::reserve_daily_budget`] consults the tenant's ledger for
//!   the current UTC day and, if the estimate fits, holds it back until the
//!   call settles. [`BudgetGuard::assert_daily_budget`] is the same check
//!   without the hold.
//!
//! A ledger tracks confirmed spend and the estimates of calls still in
//! flight. Confirmed spend only grows through [`BudgetGuard::record_spend`]
//! with the real cost once a provider has answered, so the ceiling can be
//! passed by at most the gap between one call's estimate and its actual cost.
//!
//! Amounts are kept in whole micro-dollars so repeated additions never drift.

use crate::clock::SharedClock;
use crate::config::BudgetConfig;
use crate::error::GatewayError;
use crate::protocol::types::{BudgetTier, TenantId};
use chrono::{Datelike, NaiveDate};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, warn};

const MICROS_PER_USD: f64 = 1_000_000.0;

fn to_micros(usd: f64) -> u64 {
    if usd.is_finite() && usd > 0.0 {
        (usd * MICROS_PER_USD).round() as u64
    } else {
        0
    }
}

fn to_usd(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_USD
}

type LedgerKey = (TenantId, NaiveDate);

/// One tenant's spend for one UTC day
#[derive(Debug, Clone, Copy, Default)]
struct DailyLedger {
    spent: u64,
    reserved: u64,
}

impl DailyLedger {
    fn committed(&self) -> u64 {
        self.spent.saturating_add(self.reserved)
    }
}

pub struct BudgetGuard {
    config: BudgetConfig,
    clock: SharedClock,
    ledgers: DashMap<LedgerKey, DailyLedger>,
    /// Day number of the last sweep of old ledgers
    swept_day: AtomicI32,
}

impl BudgetGuard {
    pub fn new(config: BudgetConfig, clock: SharedClock) -> Self {
        let swept_day = AtomicI32::new(clock.now().date_naive().num_days_from_ce());
        Self {
            config,
            clock,
            ledgers: DashMap::new(),
            swept_day,
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Reject a single call whose estimate exceeds the tier's per-call ceiling
    pub fn assert_budget(&self, estimated_cost_usd: f64, tier: BudgetTier) -> Result<(), GatewayError> {
        let limit = self.config.tiers.get(tier).per_request_usd;
        if to_micros(estimated_cost_usd) > to_micros(limit) {
            warn!(%tier, estimated_cost_usd, limit, "Per-request budget exceeded");
            return Err(GatewayError::BudgetExceeded {
                budget_usd: limit,
                actual_usd: estimated_cost_usd,
            });
        }
        Ok(())
    }

    /// Reject if today's spend, plus estimates still in flight, plus this
    /// estimate would exceed the daily ceiling. Nothing is held back.
    pub fn assert_daily_budget(
        &self,
        tenant: &TenantId,
        estimated_cost_usd: f64,
        tier: BudgetTier,
    ) -> Result<(), GatewayError> {
        let ledger = self.ledger(tenant, self.today());
        self.check_daily(tenant, &ledger, to_micros(estimated_cost_usd), tier)
    }

    /// Check the daily ceiling and hold the estimate against it in one step.
    ///
    /// The hold lasts until the returned reservation is committed with the
    /// real cost or dropped.
    pub fn reserve_daily_budget(
        &self,
        tenant: &TenantId,
        estimated_cost_usd: f64,
        tier: BudgetTier,
    ) -> Result<BudgetReservation<'_>, GatewayError> {
        let today = self.today();
        self.sweep_if_new_day(today);

        let key = (tenant.clone(), today);
        let micros = to_micros(estimated_cost_usd);
        {
            let mut ledger = self.ledgers.entry(key.clone()).or_default();
            self.check_daily(tenant, &ledger, micros, tier)?;
            ledger.reserved = ledger.reserved.saturating_add(micros);
        }
        debug!(%tenant, reserved_usd = to_usd(micros), "Reserved daily budget");

        Ok(BudgetReservation {
            guard: self,
            key,
            micros,
            released: false,
        })
    }

    fn check_daily(
        &self,
        tenant: &TenantId,
        ledger: &DailyLedger,
        micros: u64,
        tier: BudgetTier,
    ) -> Result<(), GatewayError> {
        let limit = self.config.tiers.get(tier).daily_usd;
        let projected = ledger.committed().saturating_add(micros);

        if projected > to_micros(limit) {
            warn!(
                %tenant,
                %tier,
                spent_usd = to_usd(ledger.spent),
                reserved_usd = to_usd(ledger.reserved),
                limit,
                "Daily budget exceeded"
            );
            return Err(GatewayError::BudgetExceeded {
                budget_usd: limit,
                actual_usd: to_usd(projected),
            });
        }
        Ok(())
    }

    /// Add the real cost of a completed call to today's ledger
    pub fn record_spend(&self, tenant: &TenantId, cost_usd: f64) {
        let micros = to_micros(cost_usd);
        if micros == 0 {
            return;
        }
        let today = self.today();
        self.sweep_if_new_day(today);

        let mut ledger = self.ledgers.entry((tenant.clone(), today)).or_default();
        ledger.spent = ledger.spent.saturating_add(micros);
        debug!(%tenant, cost_usd, spent_usd = to_usd(ledger.spent), "Recorded spend");
    }

    fn release(&self, key: &LedgerKey, micros: u64) {
        if let Some(mut ledger) = self.ledgers.get_mut(key) {
            ledger.reserved = ledger.reserved.saturating_sub(micros);
        }
        // A hold that outlived its day was the last thing keeping that ledger
        let today = self.today();
        self.ledgers
            .remove_if(key, |(_, day), ledger| *day < today && ledger.reserved == 0);
    }

    fn ledger(&self, tenant: &TenantId, day: NaiveDate) -> DailyLedger {
        self.ledgers
            .get(&(tenant.clone(), day))
            .map(|ledger| *ledger)
            .unwrap_or_default()
    }

    /// Spend recorded for the tenant on the current UTC day
    pub fn spent_today(&self, tenant: &TenantId) -> f64 {
        to_usd(self.ledger(tenant, self.today()).spent)
    }

    /// Estimates currently held for the tenant's calls in flight
    pub fn reserved_today(&self, tenant: &TenantId) -> f64 {
        to_usd(self.ledger(tenant, self.today()).reserved)
    }

    /// Headroom left under the tier's daily ceiling, never negative
    pub fn remaining_today(&self, tenant: &TenantId, tier: BudgetTier) -> f64 {
        let limit = to_micros(self.config.tiers.get(tier).daily_usd);
        to_usd(limit.saturating_sub(self.ledger(tenant, self.today()).committed()))
    }

    /// Number of (tenant, day) ledgers held in memory
    pub fn ledger_count(&self) -> usize {
        self.ledgers.len()
    }

    /// Drop ledgers for days before the current one, except those still
    /// holding reservations
    pub fn prune(&self) {
        let today = self.today();
        self.ledgers
            .retain(|(_, day), ledger| *day >= today || ledger.reserved > 0);
    }

    /// Prune once per UTC day, on the first ledger access after midnight
    fn sweep_if_new_day(&self, today: NaiveDate) {
        let day = today.num_days_from_ce();
        let last = self.swept_day.load(Ordering::Acquire);
        if day > last
            && self
                .swept_day
                .compare_exchange(last, day, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.prune();
            debug!(%today, ledgers = self.ledgers.len(), "Pruned past budget ledgers");
        }
    }
}

/// Estimate held against a tenant's daily ceiling while a call is in flight.
///
/// Dropping it releases the hold without charging anything.
#[must_use = "dropping a reservation releases it immediately"]
pub struct BudgetReservation<'a> {
    guard: &'a BudgetGuard,
    key: LedgerKey,
    micros: u64,
    released: bool,
}

impl BudgetReservation<'_> {
    pub fn amount_usd(&self) -> f64 {
        to_usd(self.micros)
    }

    /// Release the hold and charge the real cost in its place
    pub fn commit(mut self, actual_cost_usd: f64) {
        self.release();
        self.guard.record_spend(&self.key.0, actual_cost_usd);
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.guard.release(&self.key, self.micros);
        }
    }
}

impl Drop for BudgetReservation<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
