use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::model::TransitionDecision;
use super::notify::NotificationGateway;
use super::store::{BillingCandidate, SaveOutcome, StoreError, WebsiteStore};

/// Counts for one reconciliation run. Conflicts and no-longer-due skips are
/// intentionally absent: both mean the record was already handled elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pending_to_suspended: u64,
    pub active_to_overdue: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Suspended,
    MarkedOverdue,
    Skipped,
    Conflict,
    Failed,
}

/// key: billing-reconciler -> time-driven lifecycle transitions
///
/// Visits every website whose billing record may be due for a transition,
/// re-evaluates against fresh state, applies and persists the transition
/// with an optimistic status guard, and emits one best-effort notification
/// per applied transition. Failures are isolated per record; only the
/// candidate-set fetch can fail the run as a whole.
#[derive(Clone)]
pub struct BillingReconciler {
    store: Arc<dyn WebsiteStore>,
    notifier: Arc<dyn NotificationGateway>,
    concurrency: usize,
    notify_timeout: Duration,
}

impl BillingReconciler {
    pub fn new(
        store: Arc<dyn WebsiteStore>,
        notifier: Arc<dyn NotificationGateway>,
        concurrency: usize,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            concurrency: concurrency.max(1),
            notify_timeout,
        }
    }

    /// One reconciliation pass at the given instant. `now` is supplied by
    /// the caller (scheduler tick or manual trigger), never read here.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, StoreError> {
        let candidates = self.store.find_billing_candidates(now).await?;
        if candidates.is_empty() {
            debug!("no billing candidates due");
            return Ok(RunSummary::default());
        }
        info!(candidates = candidates.len(), "starting billing reconciliation run");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for candidate in candidates {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("reconciler semaphore never closed");
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                this.process_candidate(candidate, now).await
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(RecordOutcome::Suspended) => summary.pending_to_suspended += 1,
                Ok(RecordOutcome::MarkedOverdue) => summary.active_to_overdue += 1,
                Ok(RecordOutcome::Skipped | RecordOutcome::Conflict) => {}
                Ok(RecordOutcome::Failed) => summary.errors += 1,
                Err(err) => {
                    error!(?err, "billing reconciliation task aborted");
                    summary.errors += 1;
                }
            }
        }

        info!(
            pending_to_suspended = summary.pending_to_suspended,
            active_to_overdue = summary.active_to_overdue,
            errors = summary.errors,
            "billing reconciliation run finished"
        );
        Ok(summary)
    }

    async fn process_candidate(
        &self,
        candidate: BillingCandidate,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        let website_id = candidate.website_id;

        let mut record = match self.store.load_billing(website_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                warn!(%website_id, "billing record disappeared before processing, skipping");
                return RecordOutcome::Skipped;
            }
            Err(err) => {
                error!(?err, %website_id, "failed to load billing record");
                return RecordOutcome::Failed;
            }
        };

        // Re-evaluate against the fresh load: a payment or a parallel run may
        // have resolved this record after the candidate scan.
        let decision = record.evaluate_transition(now);
        let outcome = match decision {
            TransitionDecision::NoChange => {
                debug!(%website_id, status = %record.status, "candidate no longer due, skipping");
                return RecordOutcome::Skipped;
            }
            TransitionDecision::Suspend => RecordOutcome::Suspended,
            TransitionDecision::MarkOverdue => RecordOutcome::MarkedOverdue,
        };

        let prior_status = record.status;
        record.apply_transition(decision, now);

        match self.store.save_billing(website_id, &record, prior_status).await {
            Ok(SaveOutcome::Saved) => {}
            Ok(SaveOutcome::Conflict) => {
                debug!(
                    %website_id,
                    prior_status = %prior_status,
                    "billing record changed concurrently, leaving it to the other writer"
                );
                return RecordOutcome::Conflict;
            }
            Err(err) => {
                error!(
                    ?err,
                    %website_id,
                    prior_status = %prior_status,
                    at = %now,
                    "failed to persist billing transition"
                );
                return RecordOutcome::Failed;
            }
        }

        // State is the source of truth and is already persisted; the
        // notification is best-effort and bounded by a timeout.
        self.notify(decision, &candidate).await;
        outcome
    }

    async fn notify(&self, decision: TransitionDecision, candidate: &BillingCandidate) {
        let website_id = candidate.website_id;
        let contact = candidate.contact_email.as_str();
        let send = async {
            match decision {
                TransitionDecision::Suspend => self.notifier.send_suspended(website_id, contact),
                TransitionDecision::MarkOverdue => self.notifier.send_overdue(website_id, contact),
                TransitionDecision::NoChange => return Ok(()),
            }
            .await
        };
        match timeout(self.notify_timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                ?err,
                %website_id,
                "billing notification failed, transition already persisted"
            ),
            Err(_) => warn!(
                %website_id,
                "billing notification timed out, transition already persisted"
            ),
        }
    }
}
