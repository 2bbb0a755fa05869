use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clock::{self, BillingCycle};

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("payment amount must be positive")]
    InvalidAmount,
    #[error("unknown billing cycle: {0}")]
    InvalidCycle(String),
    #[error("unknown billing status: {0}")]
    InvalidStatus(String),
    #[error("price must be non-negative")]
    InvalidPrice,
}

/// key: billing-status -> post-deployment lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    /// Awaiting first payment inside the grace window.
    Pending,
    /// Paid and current.
    Active,
    /// Due date passed unpaid; the site stays reachable.
    Overdue,
    /// Grace window expired unpaid; access blocked.
    Suspended,
}

impl BillingStatus {
    pub fn parse(value: &str) -> Result<Self, BillingError> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Ok(BillingStatus::Pending),
            "active" => Ok(BillingStatus::Active),
            "overdue" => Ok(BillingStatus::Overdue),
            "suspended" => Ok(BillingStatus::Suspended),
            _ => Err(BillingError::InvalidStatus(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::Active => "active",
            BillingStatus::Overdue => "overdue",
            BillingStatus::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub amount_cents: i64,
    pub paid_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Automated transition decided for a record at a given instant. Pure output
/// of `evaluate_transition`; applying and persisting it are separate steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    NoChange,
    /// Grace window expired while still pending first payment.
    Suspend,
    /// Due date passed on an active subscription.
    MarkOverdue,
}

/// key: billing-record -> embedded per-website billing sub-document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRecord {
    pub status: BillingStatus,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    pub activated_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    /// Set once at initialization, never recomputed.
    pub grace_ends_at: DateTime<Utc>,
    #[serde(default)]
    pub last_payment_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suspended_at: Option<DateTime<Utc>>,
    /// Append-only; entries are never mutated or removed.
    #[serde(default)]
    pub payments: Vec<PaymentEntry>,
}

impl BillingRecord {
    /// Records a manually-entered payment. The only operation that extends
    /// `due_at`, and the only way out of OVERDUE or SUSPENDED.
    pub fn record_payment(
        &mut self,
        amount_cents: i64,
        now: DateTime<Utc>,
        method: Option<String>,
        transaction_id: Option<String>,
    ) -> Result<(), BillingError> {
        if amount_cents <= 0 {
            return Err(BillingError::InvalidAmount);
        }
        self.payments.push(PaymentEntry {
            amount_cents,
            paid_at: now,
            method,
            transaction_id,
        });
        self.last_payment_at = Some(now);
        self.due_at = clock::next_due_date(now, self.billing_cycle);
        self.status = BillingStatus::Active;
        Ok(())
    }

    /// Pure decision function; does not mutate. OVERDUE and SUSPENDED are
    /// stable here: only a payment or an admin edit moves them.
    pub fn evaluate_transition(&self, now: DateTime<Utc>) -> TransitionDecision {
        match self.status {
            BillingStatus::Pending if self.grace_ends_at < now => TransitionDecision::Suspend,
            BillingStatus::Active if self.due_at < now => TransitionDecision::MarkOverdue,
            _ => TransitionDecision::NoChange,
        }
    }

    pub fn apply_transition(&mut self, decision: TransitionDecision, now: DateTime<Utc>) {
        match decision {
            TransitionDecision::NoChange => {}
            TransitionDecision::Suspend => {
                self.status = BillingStatus::Suspended;
                self.suspended_at = Some(now);
            }
            TransitionDecision::MarkOverdue => {
                self.status = BillingStatus::Overdue;
            }
        }
    }

    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        clock::days_remaining(self.due_at, now)
    }
}
