use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use backend::billing::{
    clock::{add_days, initial_billing, next_due_date},
    BillingCandidate, BillingCycle, BillingReconciler, BillingRecord, BillingService,
    BillingStatus, NotificationGateway, SaveOutcome, StoreError, WebsiteStore,
};

// key: billing-reconciler-tests -> automated lifecycle flows over fakes

#[derive(Default)]
struct MemStore {
    records: Mutex<HashMap<Uuid, BillingRecord>>,
    contacts: Mutex<HashMap<Uuid, String>>,
    fail_saves_for: Mutex<HashSet<Uuid>>,
    conflict_saves_for: Mutex<HashSet<Uuid>>,
    fail_candidate_fetch: Mutex<bool>,
}

impl MemStore {
    fn insert(&self, website_id: Uuid, record: BillingRecord) {
        self.records.lock().unwrap().insert(website_id, record);
        self.contacts
            .lock()
            .unwrap()
            .insert(website_id, format!("client-{website_id}@example.com"));
    }

    fn record(&self, website_id: Uuid) -> BillingRecord {
        self.records.lock().unwrap().get(&website_id).unwrap().clone()
    }

    fn fail_saves_for(&self, website_id: Uuid) {
        self.fail_saves_for.lock().unwrap().insert(website_id);
    }

    fn conflict_saves_for(&self, website_id: Uuid) {
        self.conflict_saves_for.lock().unwrap().insert(website_id);
    }

    fn fail_candidate_fetch(&self) {
        *self.fail_candidate_fetch.lock().unwrap() = true;
    }
}

#[async_trait]
impl WebsiteStore for MemStore {
    async fn find_billing_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BillingCandidate>, StoreError> {
        if *self.fail_candidate_fetch.lock().unwrap() {
            return Err(StoreError::Db(sqlx::Error::PoolTimedOut));
        }
        let records = self.records.lock().unwrap();
        let contacts = self.contacts.lock().unwrap();
        Ok(records
            .iter()
            .filter(|(_, record)| match record.status {
                BillingStatus::Pending => record.grace_ends_at < now,
                BillingStatus::Active => record.due_at < now,
                _ => false,
            })
            .map(|(id, _)| BillingCandidate {
                website_id: *id,
                contact_email: contacts.get(id).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn load_billing(&self, website_id: Uuid) -> Result<BillingRecord, StoreError> {
        self.records
            .lock()
            .unwrap()
            .get(&website_id)
            .cloned()
            .ok_or(StoreError::NotFound(website_id))
    }

    async fn save_billing(
        &self,
        website_id: Uuid,
        record: &BillingRecord,
        expected_prior_status: BillingStatus,
    ) -> Result<SaveOutcome, StoreError> {
        if self.fail_saves_for.lock().unwrap().contains(&website_id) {
            return Err(StoreError::Db(sqlx::Error::PoolTimedOut));
        }
        if self.conflict_saves_for.lock().unwrap().contains(&website_id) {
            return Ok(SaveOutcome::Conflict);
        }
        let mut records = self.records.lock().unwrap();
        let stored = records
            .get_mut(&website_id)
            .ok_or(StoreError::NotFound(website_id))?;
        if stored.status != expected_prior_status {
            return Ok(SaveOutcome::Conflict);
        }
        *stored = record.clone();
        Ok(SaveOutcome::Saved)
    }

    async fn init_billing(
        &self,
        website_id: Uuid,
        record: &BillingRecord,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&website_id) {
            return Ok(false);
        }
        records.insert(website_id, record.clone());
        Ok(true)
    }

    async fn contact_email(&self, website_id: Uuid) -> Result<String, StoreError> {
        self.contacts
            .lock()
            .unwrap()
            .get(&website_id)
            .cloned()
            .ok_or(StoreError::NotFound(website_id))
    }
}

#[derive(Default)]
struct RecordingGateway {
    suspended: Mutex<Vec<Uuid>>,
    overdue: Mutex<Vec<Uuid>>,
    activated: Mutex<Vec<Uuid>>,
    fail_sends: Mutex<bool>,
}

impl RecordingGateway {
    fn fail_sends(&self) {
        *self.fail_sends.lock().unwrap() = true;
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.suspended.lock().unwrap().len(),
            self.overdue.lock().unwrap().len(),
            self.activated.lock().unwrap().len(),
        )
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_suspended(&self, website_id: Uuid, _contact: &str) -> Result<()> {
        self.suspended.lock().unwrap().push(website_id);
        if *self.fail_sends.lock().unwrap() {
            return Err(anyhow!("smtp relay unavailable"));
        }
        Ok(())
    }

    async fn send_overdue(&self, website_id: Uuid, _contact: &str) -> Result<()> {
        self.overdue.lock().unwrap().push(website_id);
        if *self.fail_sends.lock().unwrap() {
            return Err(anyhow!("smtp relay unavailable"));
        }
        Ok(())
    }

    async fn send_activated(&self, website_id: Uuid, _contact: &str) -> Result<()> {
        self.activated.lock().unwrap().push(website_id);
        if *self.fail_sends.lock().unwrap() {
            return Err(anyhow!("smtp relay unavailable"));
        }
        Ok(())
    }
}

fn harness() -> (Arc<MemStore>, Arc<RecordingGateway>, BillingReconciler) {
    let store = Arc::new(MemStore::default());
    let gateway = Arc::new(RecordingGateway::default());
    let reconciler = BillingReconciler::new(
        store.clone(),
        gateway.clone(),
        4,
        Duration::from_secs(5),
    );
    (store, gateway, reconciler)
}

fn t0() -> DateTime<Utc> {
    "2024-03-01T09:00:00Z".parse().unwrap()
}

#[tokio::test]
async fn pending_past_grace_is_suspended_with_one_notification() {
    let (store, gateway, reconciler) = harness();
    let website_id = Uuid::new_v4();
    store.insert(
        website_id,
        initial_billing(Some("starter"), Some(9900), BillingCycle::Monthly, t0()),
    );

    let now = add_days(t0(), 6);
    let summary = reconciler.run(now).await.unwrap();

    assert_eq!(summary.pending_to_suspended, 1);
    assert_eq!(summary.active_to_overdue, 0);
    assert_eq!(summary.errors, 0);

    let record = store.record(website_id);
    assert_eq!(record.status, BillingStatus::Suspended);
    assert_eq!(record.suspended_at, Some(now));
    assert_eq!(gateway.counts(), (1, 0, 0));
}

#[tokio::test]
async fn active_past_due_becomes_overdue_and_nothing_else_changes() {
    let (store, gateway, reconciler) = harness();
    let website_id = Uuid::new_v4();
    let mut record = initial_billing(Some("pro"), Some(19900), BillingCycle::Monthly, t0());
    record.record_payment(19900, t0(), None, None).unwrap();
    let before = record.clone();
    store.insert(website_id, record);

    let now = add_days(before.due_at, 1);
    let summary = reconciler.run(now).await.unwrap();

    assert_eq!(summary.active_to_overdue, 1);
    assert_eq!(summary.pending_to_suspended, 0);
    assert_eq!(summary.errors, 0);

    let after = store.record(website_id);
    assert_eq!(after.status, BillingStatus::Overdue);
    assert_eq!(after.due_at, before.due_at);
    assert_eq!(after.grace_ends_at, before.grace_ends_at);
    assert_eq!(after.suspended_at, None);
    assert_eq!(after.payments.len(), before.payments.len());
    assert_eq!(gateway.counts(), (0, 1, 0));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let (store, gateway, reconciler) = harness();
    let pending_id = Uuid::new_v4();
    store.insert(
        pending_id,
        initial_billing(None, None, BillingCycle::Monthly, t0()),
    );
    let active_id = Uuid::new_v4();
    let mut active = initial_billing(None, None, BillingCycle::Monthly, t0());
    active.record_payment(500, t0(), None, None).unwrap();
    store.insert(active_id, active);

    let now = add_days(t0(), 40);
    let first = reconciler.run(now).await.unwrap();
    assert_eq!(first.pending_to_suspended, 1);
    assert_eq!(first.active_to_overdue, 1);

    let suspended_after_first = store.record(pending_id);
    let overdue_after_first = store.record(active_id);

    let second = reconciler.run(now).await.unwrap();
    assert_eq!(second.pending_to_suspended, 0);
    assert_eq!(second.active_to_overdue, 0);
    assert_eq!(second.errors, 0);

    assert_eq!(store.record(pending_id).status, suspended_after_first.status);
    assert_eq!(store.record(active_id).status, overdue_after_first.status);
    // No additional notifications on the second pass.
    assert_eq!(gateway.counts(), (1, 1, 0));
}

#[tokio::test]
async fn overdue_is_never_auto_suspended() {
    let (store, gateway, reconciler) = harness();
    let website_id = Uuid::new_v4();
    let mut record = initial_billing(None, None, BillingCycle::Monthly, t0());
    record.record_payment(500, t0(), None, None).unwrap();
    store.insert(website_id, record);

    let overdue_at = add_days(t0(), 40);
    reconciler.run(overdue_at).await.unwrap();
    assert_eq!(store.record(website_id).status, BillingStatus::Overdue);

    // Months later, still overdue: suspension only ever follows the grace
    // deadline on a pending record.
    let much_later = add_days(t0(), 400);
    let summary = reconciler.run(much_later).await.unwrap();
    assert_eq!(summary.pending_to_suspended, 0);
    assert_eq!(summary.active_to_overdue, 0);
    assert_eq!(store.record(website_id).status, BillingStatus::Overdue);
    assert_eq!(gateway.counts(), (0, 1, 0));
}

#[tokio::test]
async fn per_record_failure_does_not_abort_the_rest() {
    let (store, gateway, reconciler) = harness();
    let mut ids = Vec::new();
    for _ in 0..10 {
        let id = Uuid::new_v4();
        store.insert(id, initial_billing(None, None, BillingCycle::Monthly, t0()));
        ids.push(id);
    }
    store.fail_saves_for(ids[4]);

    let now = add_days(t0(), 6);
    let summary = reconciler.run(now).await.unwrap();

    assert_eq!(summary.pending_to_suspended, 9);
    assert_eq!(summary.errors, 1);
    for (index, id) in ids.iter().enumerate() {
        let expected = if index == 4 {
            BillingStatus::Pending
        } else {
            BillingStatus::Suspended
        };
        assert_eq!(store.record(*id).status, expected);
    }
    assert_eq!(gateway.counts(), (9, 0, 0));
}

#[tokio::test]
async fn conflict_is_not_an_error_and_sends_nothing() {
    let (store, gateway, reconciler) = harness();
    let website_id = Uuid::new_v4();
    store.insert(
        website_id,
        initial_billing(None, None, BillingCycle::Monthly, t0()),
    );
    store.conflict_saves_for(website_id);

    let summary = reconciler.run(add_days(t0(), 6)).await.unwrap();

    assert_eq!(summary.pending_to_suspended, 0);
    assert_eq!(summary.active_to_overdue, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(gateway.counts(), (0, 0, 0));
}

#[tokio::test]
async fn notification_failure_does_not_roll_back_the_transition() {
    let (store, gateway, reconciler) = harness();
    let website_id = Uuid::new_v4();
    store.insert(
        website_id,
        initial_billing(None, None, BillingCycle::Monthly, t0()),
    );
    gateway.fail_sends();

    let now = add_days(t0(), 6);
    let summary = reconciler.run(now).await.unwrap();

    // The send was attempted exactly once and failed; the transition stands
    // and is not counted as an error.
    assert_eq!(summary.pending_to_suspended, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.record(website_id).status, BillingStatus::Suspended);
    assert_eq!(gateway.counts(), (1, 0, 0));
}

#[tokio::test]
async fn candidate_fetch_failure_aborts_the_run() {
    let (store, _gateway, reconciler) = harness();
    store.fail_candidate_fetch();
    assert!(reconciler.run(t0()).await.is_err());
}

#[tokio::test]
async fn deployment_to_payment_lifecycle() {
    let (store, gateway, reconciler) = harness();
    let service = BillingService::new(store.clone(), gateway.clone(), Duration::from_secs(5));
    let website_id = Uuid::new_v4();

    // Deployed at T0 with default terms.
    let record = initial_billing(None, None, BillingCycle::Monthly, t0());
    assert_eq!(record.status, BillingStatus::Pending);
    assert_eq!(record.grace_ends_at, add_days(t0(), 5));
    assert_eq!(record.due_at, record.grace_ends_at);
    store.insert(website_id, record);

    // Unpaid at T0+6d: suspended.
    reconciler.run(add_days(t0(), 6)).await.unwrap();
    assert_eq!(store.record(website_id).status, BillingStatus::Suspended);

    // Manual payment at T0+7d reactivates and extends the due date by one
    // cycle from the payment time.
    let paid_at = add_days(t0(), 7);
    let updated = service
        .record_payment(website_id, 9900, Some("bank_transfer".into()), None, paid_at)
        .await
        .unwrap();
    assert_eq!(updated.status, BillingStatus::Active);
    assert_eq!(updated.due_at, next_due_date(paid_at, BillingCycle::Monthly));
    assert_eq!(store.record(website_id).status, BillingStatus::Active);
    assert_eq!(gateway.counts(), (1, 0, 1));

    // Nothing further is due right after the payment.
    let summary = reconciler.run(add_days(t0(), 8)).await.unwrap();
    assert_eq!(summary, Default::default());
}
