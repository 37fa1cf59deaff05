//! Unified REST API router combining all module route tables.

use axum::{routing::get, Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::managers::configure_managers_routes())
        .merge(crate::dashboards::configure_dashboards_routes())
        .merge(crate::import::configure_import_routes())
        .merge(crate::events::configure_events_routes())
}
