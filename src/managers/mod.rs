use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::models::{BusinessUnit, Manager, ManagerWithOffice};
use crate::shared::schema::{business_units, managers};
use crate::shared::state::AppState;

pub async fn list_managers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ManagerWithOffice>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<(Manager, BusinessUnit)> = managers::table
        .inner_join(business_units::table)
        .order(managers::full_name.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let result = rows
        .into_iter()
        .map(|(manager, office)| ManagerWithOffice::new(manager, &office))
        .collect();

    Ok(Json(result))
}

pub async fn get_manager(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ManagerWithOffice>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let (manager, office): (Manager, BusinessUnit) = managers::table
        .inner_join(business_units::table)
        .filter(managers::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Manager not found".to_string()))?;

    Ok(Json(ManagerWithOffice::new(manager, &office)))
}

pub async fn list_offices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BusinessUnit>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let offices: Vec<BusinessUnit> = business_units::table
        .order(business_units::name.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(offices))
}

pub async fn get_office(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BusinessUnit>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let office: BusinessUnit = business_units::table
        .find(id)
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Office not found".to_string()))?;

    Ok(Json(office))
}

pub fn configure_managers_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/managers", get(list_managers))
        .route("/api/managers/:id", get(get_manager))
        .route("/api/offices", get(list_offices))
        .route("/api/offices/:id", get(get_office))
}
