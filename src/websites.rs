use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::billing::{initial_billing, BillingCycle, BillingError, BillingRecord, WebsiteStore};
use crate::error::{AppError, AppResult};
use crate::extractor::{AdminUser, AuthUser};

/// key: websites -> owning entity for the billing sub-document
#[derive(Debug, Serialize)]
pub struct Website {
    pub id: Uuid,
    pub client_email: String,
    pub name: String,
    pub domain: Option<String>,
    pub delivery_status: String,
    pub billing: Option<BillingRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWebsiteRequest {
    pub client_email: String,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Billing terms handed over at deployment. All optional; a bare deploy
/// starts a default monthly record.
#[derive(Debug, Default, Deserialize)]
pub struct DeployWebsiteRequest {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub billing_cycle: Option<String>,
}

pub async fn create_website(
    Extension(pool): Extension<PgPool>,
    _admin: AdminUser,
    Json(payload): Json<CreateWebsiteRequest>,
) -> AppResult<(StatusCode, Json<Website>)> {
    if payload.client_email.trim().is_empty() || payload.name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "client_email and name are required".into(),
        ));
    }
    let row = sqlx::query(
        r#"
        INSERT INTO websites (id, client_email, name, domain)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payload.client_email.trim())
    .bind(payload.name.trim())
    .bind(payload.domain.as_deref())
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(map_row(&row)?)))
}

pub async fn list_websites(
    Extension(pool): Extension<PgPool>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<Website>>> {
    let rows = sqlx::query("SELECT * FROM websites ORDER BY created_at ASC")
        .fetch_all(&pool)
        .await?;
    let websites = rows
        .iter()
        .map(map_row)
        .collect::<AppResult<Vec<Website>>>()?;
    Ok(Json(websites))
}

pub async fn get_website(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(website_id): Path<Uuid>,
) -> AppResult<Json<Website>> {
    let row = sqlx::query("SELECT * FROM websites WHERE id = $1")
        .bind(website_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(map_row(&row)?))
}

/// Marks a website deployed and initializes its billing record exactly once.
/// Redeploys keep the existing record untouched.
pub async fn deploy_website(
    Extension(pool): Extension<PgPool>,
    Extension(store): Extension<std::sync::Arc<dyn WebsiteStore>>,
    _admin: AdminUser,
    Path(website_id): Path<Uuid>,
    Json(payload): Json<DeployWebsiteRequest>,
) -> AppResult<Json<Website>> {
    let cycle = match payload.billing_cycle.as_deref() {
        Some(raw) => BillingCycle::parse(raw)?,
        None => BillingCycle::default(),
    };
    if payload.price_cents.is_some_and(|price| price < 0) {
        return Err(BillingError::InvalidPrice.into());
    }

    let result = sqlx::query(
        "UPDATE websites SET delivery_status = 'deployed', updated_at = NOW() WHERE id = $1",
    )
    .bind(website_id)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    let record = initial_billing(
        payload.plan.as_deref(),
        payload.price_cents,
        cycle,
        Utc::now(),
    );
    let initialized = store.init_billing(website_id, &record).await?;
    if !initialized {
        tracing::debug!(%website_id, "billing already initialized, keeping existing record");
    }

    let row = sqlx::query("SELECT * FROM websites WHERE id = $1")
        .bind(website_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(map_row(&row)?))
}

fn map_row(row: &PgRow) -> AppResult<Website> {
    let billing: Option<Value> = row.try_get("billing").ok().flatten();
    let billing = billing
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| AppError::Message(format!("billing document malformed: {err}")))?;
    Ok(Website {
        id: row.get("id"),
        client_email: row.get("client_email"),
        name: row.get("name"),
        domain: row.try_get("domain").ok().flatten(),
        delivery_status: row.get("delivery_status"),
        billing,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
