//! Admission control: checks performed before any provider is contacted

pub mod budget;
pub mod rate_limit;

pub use budget::{BudgetGuard, BudgetReservation};
pub use rate_limit::{RateLimitWindow, RateLimiter};
