use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::model::{BillingError, BillingRecord, BillingStatus};

/// Days a freshly deployed website may remain unpaid before suspension.
pub const GRACE_PERIOD_DAYS: i64 = 5;

/// key: billing-cycle -> recurring payment interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    /// Strict parse for admin-facing input. Unknown values are rejected.
    pub fn parse(value: &str) -> Result<Self, BillingError> {
        match value.to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "yearly" => Ok(BillingCycle::Yearly),
            _ => Err(BillingError::InvalidCycle(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Yearly => "yearly",
        }
    }

    fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Quarterly => 3,
            BillingCycle::Yearly => 12,
        }
    }
}

// Stored documents may predate the current cycle set. Unknown values fall
// back to monthly, with a warning so the fallback is visible.
impl<'de> Deserialize<'de> for BillingCycle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(BillingCycle::parse(&raw).unwrap_or_else(|_| {
            tracing::warn!(cycle = %raw, "unknown billing cycle in stored record, falling back to monthly");
            BillingCycle::Monthly
        }))
    }
}

pub fn add_days(date: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    date + Duration::days(days)
}

/// Calendar month addition with chrono's clamping rule: the day-of-month is
/// clamped to the target month's length, so 2024-01-31 + 1 month is
/// 2024-02-29. Every due-date computation in the crate goes through here so
/// the rule is applied uniformly.
pub fn add_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

pub fn next_due_date(from: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    add_months(from, cycle.months())
}

/// Whole days until `due`, rounded up; negative once the deadline has passed.
pub fn days_remaining(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (due - now).num_seconds();
    (secs + 86_399).div_euclid(86_400)
}

/// Fresh billing record for a website that just reached deployment. The
/// grace deadline doubles as the first due date.
pub fn initial_billing(
    plan: Option<&str>,
    price_cents: Option<i64>,
    cycle: BillingCycle,
    now: DateTime<Utc>,
) -> BillingRecord {
    let grace_ends_at = add_days(now, GRACE_PERIOD_DAYS);
    BillingRecord {
        status: BillingStatus::Pending,
        plan: plan
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty()),
        price_cents,
        billing_cycle: cycle,
        activated_at: now,
        due_at: grace_ends_at,
        grace_ends_at,
        last_payment_at: None,
        suspended_at: None,
        payments: Vec::new(),
    }
}
