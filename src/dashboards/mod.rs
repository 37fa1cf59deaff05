use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use serde::Serialize;
use std::sync::Arc;

use crate::shared::schema::{business_units, managers, ticket_ai, tickets};
use crate::shared::state::AppState;

type HandlerError = (StatusCode, String);

fn db_error<E: std::fmt::Display>(e: E) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}"))
}

#[derive(Debug, QueryableByName)]
struct AiAverages {
    #[diesel(sql_type = Double)]
    avg_priority: f64,
    #[diesel(sql_type = Double)]
    avg_confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_tickets: i64,
    pub routed_tickets: i64,
    pub pending_tickets: i64,
    pub avg_priority: f64,
    pub avg_confidence: f64,
    pub vip_count: i64,
    pub unknown_geo_count: i64,
    pub active_managers: i64,
    pub total_offices: i64,
    pub ai_processed_count: i64,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, HandlerError> {
    let mut conn = state.conn.get().map_err(db_error)?;

    let total_tickets: i64 = tickets::table.count().get_result(&mut conn).map_err(db_error)?;
    let routed_tickets: i64 = tickets::table
        .filter(tickets::status.eq("routed"))
        .count()
        .get_result(&mut conn)
        .map_err(db_error)?;
    let pending_tickets: i64 = tickets::table
        .filter(tickets::status.eq_any(["new", "enriching"]))
        .count()
        .get_result(&mut conn)
        .map_err(db_error)?;
    let averages: AiAverages = diesel::sql_query(
        "SELECT COALESCE(AVG(priority_1_10), 0)::float8 AS avg_priority, \
                COALESCE(AVG(confidence_type), 0)::float8 AS avg_confidence \
         FROM ticket_ai",
    )
    .get_result(&mut conn)
    .map_err(db_error)?;
    let vip_count: i64 = tickets::table
        .filter(tickets::client_segment.eq("VIP"))
        .count()
        .get_result(&mut conn)
        .map_err(db_error)?;
    let unknown_geo_count: i64 = ticket_ai::table
        .filter(ticket_ai::geo_status.ne("known"))
        .count()
        .get_result(&mut conn)
        .map_err(db_error)?;
    let active_managers: i64 = managers::table
        .filter(managers::is_active.eq(true))
        .count()
        .get_result(&mut conn)
        .map_err(db_error)?;
    let total_offices: i64 = business_units::table.count().get_result(&mut conn).map_err(db_error)?;
    let ai_processed_count: i64 = ticket_ai::table.count().get_result(&mut conn).map_err(db_error)?;

    Ok(Json(DashboardStats {
        total_tickets,
        routed_tickets,
        pending_tickets,
        avg_priority: averages.avg_priority,
        avg_confidence: averages.avg_confidence,
        vip_count,
        unknown_geo_count,
        active_managers,
        total_offices,
        ai_processed_count,
    }))
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct LabelCount {
    #[diesel(sql_type = Nullable<Text>)]
    pub label: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct SentimentData {
    pub sentiment: String,
    pub count: i64,
}

pub async fn sentiment(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SentimentData>>, HandlerError> {
    let mut conn = state.conn.get().map_err(db_error)?;

    let rows: Vec<LabelCount> = diesel::sql_query(
        "SELECT sentiment AS label, COUNT(*) AS count FROM ticket_ai \
         GROUP BY sentiment ORDER BY COUNT(*) DESC",
    )
    .load(&mut conn)
    .map_err(db_error)?;

    Ok(Json(
        rows.into_iter()
            .map(|r| SentimentData {
                sentiment: r.label.unwrap_or_else(|| "unknown".to_string()),
                count: r.count,
            })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct CategoryData {
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub count: i64,
}

pub async fn categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryData>>, HandlerError> {
    let mut conn = state.conn.get().map_err(db_error)?;

    let rows: Vec<LabelCount> = diesel::sql_query(
        "SELECT type AS label, COUNT(*) AS count FROM ticket_ai \
         GROUP BY type ORDER BY COUNT(*) DESC",
    )
    .load(&mut conn)
    .map_err(db_error)?;

    Ok(Json(
        rows.into_iter()
            .map(|r| CategoryData {
                ticket_type: r.label.unwrap_or_else(|| "unknown".to_string()),
                count: r.count,
            })
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct ManagerLoadData {
    pub manager_name: String,
    pub office: String,
    pub current_load: i32,
    pub max_load: i32,
    pub utilization_pct: f64,
}

pub async fn manager_load(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ManagerLoadData>>, HandlerError> {
    let mut conn = state.conn.get().map_err(db_error)?;

    let rows: Vec<(String, String, i32, i32)> = managers::table
        .inner_join(business_units::table)
        .filter(managers::is_active.eq(true))
        .select((
            managers::full_name,
            business_units::city,
            managers::current_load,
            managers::max_load,
        ))
        .order(managers::current_load.desc())
        .load(&mut conn)
        .map_err(db_error)?;

    Ok(Json(
        rows.into_iter()
            .map(|(manager_name, office, current_load, max_load)| ManagerLoadData {
                utilization_pct: if max_load > 0 {
                    f64::from(current_load) / f64::from(max_load) * 100.0
                } else {
                    0.0
                },
                manager_name,
                office,
                current_load,
                max_load,
            })
            .collect(),
    ))
}

#[derive(Debug, Serialize, QueryableByName)]
pub struct TimelineData {
    #[diesel(sql_type = Text)]
    pub date: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn timeline(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TimelineData>>, HandlerError> {
    let mut conn = state.conn.get().map_err(db_error)?;

    let rows: Vec<TimelineData> = diesel::sql_query(
        "SELECT DATE(created_at)::text AS date, COUNT(*) AS count FROM tickets \
         GROUP BY DATE(created_at) ORDER BY DATE(created_at) DESC LIMIT 30",
    )
    .load(&mut conn)
    .map_err(db_error)?;

    Ok(Json(rows))
}

pub fn configure_dashboards_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/dashboard/stats", get(stats))
        .route("/api/dashboard/sentiment", get(sentiment))
        .route("/api/dashboard/categories", get(categories))
        .route("/api/dashboard/manager-load", get(manager_load))
        .route("/api/dashboard/timeline", get(timeline))
}
