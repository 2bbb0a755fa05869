use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::clock::BillingCycle;
use super::model::{BillingError, BillingRecord, BillingStatus};
use super::notify::NotificationGateway;
use super::store::{SaveOutcome, WebsiteStore};

/// Admin-facing billing edit. Absent fields are left untouched; enum fields
/// arrive as free text and are validated strictly.
#[derive(Debug, Default)]
pub struct BillingUpdate {
    pub plan: Option<String>,
    pub price_cents: Option<i64>,
    pub billing_cycle: Option<String>,
    pub status: Option<String>,
}

/// key: billing-service -> direct billing operations
///
/// Payment recording and admin overrides bypass the automated state machine
/// but go through the same conditional persistence as the reconciler.
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn WebsiteStore>,
    notifier: Arc<dyn NotificationGateway>,
    notify_timeout: Duration,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn WebsiteStore>,
        notifier: Arc<dyn NotificationGateway>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            notify_timeout,
        }
    }

    pub async fn get_billing(&self, website_id: Uuid) -> AppResult<BillingRecord> {
        Ok(self.store.load_billing(website_id).await?)
    }

    pub async fn update_billing(
        &self,
        website_id: Uuid,
        update: BillingUpdate,
    ) -> AppResult<BillingRecord> {
        let mut record = self.store.load_billing(website_id).await?;
        let prior_status = record.status;

        if let Some(plan) = update.plan {
            let normalized = plan.trim().to_ascii_lowercase();
            record.plan = (!normalized.is_empty()).then_some(normalized);
        }
        if let Some(price_cents) = update.price_cents {
            if price_cents < 0 {
                return Err(BillingError::InvalidPrice.into());
            }
            record.price_cents = Some(price_cents);
        }
        if let Some(cycle) = update.billing_cycle.as_deref() {
            record.billing_cycle = BillingCycle::parse(cycle)?;
        }
        if let Some(status) = update.status.as_deref() {
            record.status = BillingStatus::parse(status)?;
        }

        match self
            .store
            .save_billing(website_id, &record, prior_status)
            .await?
        {
            SaveOutcome::Saved => Ok(record),
            SaveOutcome::Conflict => Err(AppError::Conflict(
                "billing record was modified concurrently".into(),
            )),
        }
    }

    pub async fn record_payment(
        &self,
        website_id: Uuid,
        amount_cents: i64,
        method: Option<String>,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<BillingRecord> {
        let mut record = self.store.load_billing(website_id).await?;
        let prior_status = record.status;
        record.record_payment(amount_cents, now, method, transaction_id)?;

        match self
            .store
            .save_billing(website_id, &record, prior_status)
            .await?
        {
            SaveOutcome::Saved => {}
            SaveOutcome::Conflict => {
                return Err(AppError::Conflict(
                    "billing record was modified concurrently, retry".into(),
                ))
            }
        }

        // Payment is persisted; the activation notice is best-effort.
        match self.store.contact_email(website_id).await {
            Ok(contact) => {
                let send = self.notifier.send_activated(website_id, &contact);
                match timeout(self.notify_timeout, send).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(?err, %website_id, "activation notification failed"),
                    Err(_) => warn!(%website_id, "activation notification timed out"),
                }
            }
            Err(err) => {
                warn!(?err, %website_id, "could not resolve contact for activation notification")
            }
        }

        Ok(record)
    }
}
