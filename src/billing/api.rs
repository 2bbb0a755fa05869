use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::extractor::{AdminUser, AuthUser};

use super::model::BillingRecord;
use super::reconciler::{BillingReconciler, RunSummary};
use super::service::{BillingService, BillingUpdate};

/// key: billing-api -> rest endpoints
pub async fn get_billing(
    Extension(service): Extension<BillingService>,
    _user: AuthUser,
    Path(website_id): Path<Uuid>,
) -> AppResult<Json<BillingEnvelope>> {
    let record = service.get_billing(website_id).await?;
    Ok(Json(BillingEnvelope::new(website_id, record)))
}

pub async fn update_billing(
    Extension(service): Extension<BillingService>,
    _admin: AdminUser,
    Path(website_id): Path<Uuid>,
    Json(payload): Json<UpdateBillingRequest>,
) -> AppResult<Json<BillingEnvelope>> {
    let record = service
        .update_billing(
            website_id,
            BillingUpdate {
                plan: payload.plan,
                price_cents: payload.price_cents,
                billing_cycle: payload.billing_cycle,
                status: payload.status,
            },
        )
        .await?;
    Ok(Json(BillingEnvelope::new(website_id, record)))
}

pub async fn record_payment(
    Extension(service): Extension<BillingService>,
    _admin: AdminUser,
    Path(website_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> AppResult<Json<BillingEnvelope>> {
    let record = service
        .record_payment(
            website_id,
            payload.amount_cents,
            payload.method,
            payload.transaction_id,
            Utc::now(),
        )
        .await?;
    Ok(Json(BillingEnvelope::new(website_id, record)))
}

/// Operator-facing "run reconciliation now". Returns the run summary; a
/// failure here means the candidate scan itself failed.
pub async fn trigger_reconciliation(
    Extension(reconciler): Extension<Arc<BillingReconciler>>,
    _admin: AdminUser,
) -> AppResult<Json<RunSummary>> {
    let summary = reconciler.run(Utc::now()).await.map_err(AppError::from)?;
    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct BillingEnvelope {
    pub website_id: Uuid,
    pub days_remaining: i64,
    pub billing: BillingRecord,
}

impl BillingEnvelope {
    fn new(website_id: Uuid, billing: BillingRecord) -> Self {
        Self {
            website_id,
            days_remaining: billing.days_remaining(Utc::now()),
            billing,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBillingRequest {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub billing_cycle: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}
