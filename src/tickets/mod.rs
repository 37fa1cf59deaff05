use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::classifier::extract_city_from_address;
use crate::shared::models::{
    BusinessUnit, Manager, ManagerWithOffice, Ticket, TicketAi, TicketAssignment,
    TicketWithDetails,
};
use crate::shared::schema::{business_units, managers, ticket_ai, ticket_assignment, tickets};
use crate::shared::state::AppState;
use crate::shared::utils::haversine_km;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<String>,
    pub segment: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct PaginatedTickets {
    pub data: Vec<Ticket>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PaginatedTickets>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 200);

    let mut count_q = tickets::table.into_boxed();
    let mut list_q = tickets::table.into_boxed();

    if let Some(status) = &query.status {
        count_q = count_q.filter(tickets::status.eq(status.clone()));
        list_q = list_q.filter(tickets::status.eq(status.clone()));
    }
    if let Some(segment) = &query.segment {
        count_q = count_q.filter(tickets::client_segment.eq(segment.clone()));
        list_q = list_q.filter(tickets::client_segment.eq(segment.clone()));
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{search}%");
        count_q = count_q.filter(
            tickets::subject
                .ilike(pattern.clone())
                .or(tickets::body.ilike(pattern.clone())),
        );
        list_q = list_q.filter(
            tickets::subject
                .ilike(pattern.clone())
                .or(tickets::body.ilike(pattern)),
        );
    }

    let total: i64 = count_q
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let data: Vec<Ticket> = list_q
        .order(tickets::created_at.desc())
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(Json(PaginatedTickets {
        data,
        pagination: Pagination {
            page,
            per_page,
            total,
            total_pages,
        },
    }))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketWithDetails>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let ticket: Ticket = tickets::table
        .find(id)
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Ticket not found".to_string()))?;

    let ai: Option<TicketAi> = ticket_ai::table
        .filter(ticket_ai::ticket_id.eq(id))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let assignment: Option<TicketAssignment> = ticket_assignment::table
        .filter(ticket_assignment::ticket_id.eq(id))
        .filter(ticket_assignment::is_current.eq(true))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut assigned_manager = None;
    let mut office_coords = None;
    if let Some(assignment) = &assignment {
        let manager: Option<Manager> = managers::table
            .find(assignment.manager_id)
            .first(&mut conn)
            .optional()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

        if let Some(manager) = manager {
            let office: Option<BusinessUnit> = business_units::table
                .find(manager.business_unit_id)
                .first(&mut conn)
                .optional()
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

            if let Some(office) = office {
                office_coords = office.lat.zip(office.lon);
                assigned_manager = Some(ManagerWithOffice::new(manager, &office));
            }
        }
    }

    let distance_km = ai
        .as_ref()
        .and_then(|ai| ai.lat.zip(ai.lon))
        .zip(office_coords)
        .map(|((lat, lon), (office_lat, office_lon))| {
            haversine_km(lat, lon, office_lat, office_lon)
        });

    let geo_city = extract_city_from_address(ticket.raw_address.as_deref());

    let audit_trail = state
        .audit
        .list_for_ticket(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(TicketWithDetails {
        ticket,
        ai,
        assignment,
        assigned_manager,
        geo_city,
        distance_km,
        audit_trail,
    }))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let updated = diesel::update(tickets::table.find(id))
        .set((tickets::status.eq(&req.status), tickets::updated_at.eq(Utc::now())))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "Ticket not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "status": req.status })))
}

/// Kick off enrichment for one ticket. The task is detached from the
/// request so a disconnecting client never aborts a write in progress.
pub async fn enrich_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = tickets::table
        .filter(tickets::id.eq(id))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Ticket not found".to_string()));
    }

    spawn_enrichment(&state, id);

    Ok(Json(serde_json::json!({
        "ticket_id": id,
        "status": "enriching",
    })))
}

/// Enrich every ticket still in status `new`.
pub async fn enrich_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let ids: Vec<Uuid> = tickets::table
        .filter(tickets::status.eq("new"))
        .select(tickets::id)
        .order(tickets::created_at.asc())
        .limit(1000)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    for id in &ids {
        spawn_enrichment(&state, *id);
    }

    Ok(Json(serde_json::json!({ "triggered": ids.len() })))
}

pub fn spawn_enrichment(state: &Arc<AppState>, ticket_id: Uuid) {
    state.enrichment.spawn(ticket_id);
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets))
        .route("/api/tickets/enrich-all", post(enrich_all))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/status", patch(update_status))
        .route("/api/tickets/:id/enrich", post(enrich_ticket))
}
