use axum::{
    routing::{get, post},
    Router,
};

use crate::{billing, websites};

pub fn api_routes() -> Router {
    Router::new()
        .route(
            "/api/websites",
            get(websites::list_websites).post(websites::create_website),
        )
        .route("/api/websites/:id", get(websites::get_website))
        .route("/api/websites/:id/deploy", post(websites::deploy_website))
        .route(
            "/api/websites/:id/billing",
            get(billing::api::get_billing).patch(billing::api::update_billing),
        )
        .route(
            "/api/websites/:id/payments",
            post(billing::api::record_payment),
        )
        .route(
            "/api/billing/reconcile",
            post(billing::api::trigger_reconciliation),
        )
}
