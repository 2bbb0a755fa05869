use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

use super::model::{BillingRecord, BillingStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("website {0} has no billing record")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("stored billing document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result of a conditional billing write. A conflict means the stored status
/// no longer matches what the caller read, i.e. another process got there
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Conflict,
}

/// Row projection the reconciler scans: just enough to drive a per-record
/// load and a notification.
#[derive(Debug, Clone)]
pub struct BillingCandidate {
    pub website_id: Uuid,
    pub contact_email: String,
}

/// key: billing-store -> single-record read-modify-write boundary
#[async_trait]
pub trait WebsiteStore: Send + Sync {
    /// Websites whose stored timestamps indicate a transition may be due.
    /// The predicate runs store-side; callers still re-evaluate per record.
    async fn find_billing_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BillingCandidate>, StoreError>;

    async fn load_billing(&self, website_id: Uuid) -> Result<BillingRecord, StoreError>;

    /// Persists the record only if the stored status still equals
    /// `expected_prior_status`.
    async fn save_billing(
        &self,
        website_id: Uuid,
        record: &BillingRecord,
        expected_prior_status: BillingStatus,
    ) -> Result<SaveOutcome, StoreError>;

    /// Attaches a billing record to a website that has none yet. Returns
    /// `false` when billing was already initialized.
    async fn init_billing(
        &self,
        website_id: Uuid,
        record: &BillingRecord,
    ) -> Result<bool, StoreError>;

    async fn contact_email(&self, website_id: Uuid) -> Result<String, StoreError>;
}

/// key: billing-store-pg -> websites table, JSONB billing sub-document
#[derive(Clone)]
pub struct PgWebsiteStore {
    pool: PgPool,
}

impl PgWebsiteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn website_exists(&self, website_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM websites WHERE id = $1")
            .bind(website_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl WebsiteStore for PgWebsiteStore {
    async fn find_billing_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<BillingCandidate>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, client_email
            FROM websites
            WHERE (billing->>'status' = 'pending'
                   AND (billing->>'grace_ends_at')::timestamptz < $1)
               OR (billing->>'status' = 'active'
                   AND (billing->>'due_at')::timestamptz < $1)
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BillingCandidate {
                website_id: row.get("id"),
                contact_email: row.get("client_email"),
            })
            .collect())
    }

    async fn load_billing(&self, website_id: Uuid) -> Result<BillingRecord, StoreError> {
        let row = sqlx::query("SELECT billing FROM websites WHERE id = $1")
            .bind(website_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(website_id))?;

        let document: Option<Value> = row.try_get("billing").ok().flatten();
        let document = document.ok_or(StoreError::NotFound(website_id))?;
        Ok(serde_json::from_value(document)?)
    }

    async fn save_billing(
        &self,
        website_id: Uuid,
        record: &BillingRecord,
        expected_prior_status: BillingStatus,
    ) -> Result<SaveOutcome, StoreError> {
        let document = serde_json::to_value(record)?;
        let result = sqlx::query(
            r#"
            UPDATE websites
            SET billing = $2, updated_at = NOW()
            WHERE id = $1 AND billing->>'status' = $3
            "#,
        )
        .bind(website_id)
        .bind(&document)
        .bind(expected_prior_status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(SaveOutcome::Saved);
        }
        if self.website_exists(website_id).await? {
            Ok(SaveOutcome::Conflict)
        } else {
            Err(StoreError::NotFound(website_id))
        }
    }

    async fn init_billing(
        &self,
        website_id: Uuid,
        record: &BillingRecord,
    ) -> Result<bool, StoreError> {
        let document = serde_json::to_value(record)?;
        let result = sqlx::query(
            r#"
            UPDATE websites
            SET billing = $2, updated_at = NOW()
            WHERE id = $1 AND billing IS NULL
            "#,
        )
        .bind(website_id)
        .bind(&document)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.website_exists(website_id).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound(website_id))
        }
    }

    async fn contact_email(&self, website_id: Uuid) -> Result<String, StoreError> {
        let row = sqlx::query("SELECT client_email FROM websites WHERE id = $1")
            .bind(website_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(website_id))?;
        Ok(row.get("client_email"))
    }
}
