use std::sync::Arc;

use chrono::Utc;
use tokio::time::{self, Duration};
use tracing::{info, warn};

use crate::config;

use super::reconciler::BillingReconciler;

/// key: billing-scheduler -> periodic reconciliation trigger
///
/// The only place `now` is read from the system clock; everything below it
/// takes the instant as an argument.
pub fn spawn(reconciler: Arc<BillingReconciler>) {
    let interval = Duration::from_secs(*config::BILLING_RECONCILE_INTERVAL_SECS);
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            match reconciler.run(Utc::now()).await {
                Ok(summary) => info!(
                    pending_to_suspended = summary.pending_to_suspended,
                    active_to_overdue = summary.active_to_overdue,
                    errors = summary.errors,
                    "billing reconciliation tick finished"
                ),
                Err(err) => warn!(?err, "billing reconciliation tick failed"),
            }
        }
    });
}
