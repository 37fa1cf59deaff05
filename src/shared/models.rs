use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{
    audit_log, business_units, managers, rr_pointer, ticket_ai, ticket_assignment, tickets,
};

/// Client segments carrying elevated routing priority.
pub const SEGMENT_VIP: &str = "VIP";
pub const SEGMENT_PRIORITY: &str = "Priority";

/// Audit trail step names, stable strings consumed by the read-side UI.
pub const AUDIT_STEP_AI_ENRICH: &str = "ai_enrich";
pub const AUDIT_STEP_GEO_FILTER: &str = "geo_filter";
pub const AUDIT_STEP_SKILL_FILTER: &str = "skill_filter";
pub const AUDIT_STEP_LOAD_BALANCE: &str = "load_balance";
pub const AUDIT_STEP_ROUND_ROBIN: &str = "round_robin";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub external_id: Option<String>,
    pub subject: String,
    pub body: String,
    pub client_name: Option<String>,
    pub client_segment: Option<String>,
    pub source_channel: Option<String>,
    pub status: String,
    pub raw_address: Option<String>,
    pub attachments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = ticket_ai)]
pub struct TicketAi {
    pub id: Uuid,
    pub ticket_id: Uuid,
    #[serde(rename = "type")]
    pub ticket_type: Option<String>,
    pub sentiment: Option<String>,
    pub priority_1_10: Option<i32>,
    pub lang: String,
    pub summary: Option<String>,
    pub recommended_actions: serde_json::Value,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub geo_status: String,
    pub confidence_type: Option<f64>,
    pub confidence_sentiment: Option<f64>,
    pub confidence_priority: Option<f64>,
    pub processing_ms: Option<i32>,
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = managers)]
pub struct Manager {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub business_unit_id: Uuid,
    pub is_vip_skill: bool,
    pub is_chief_spec: bool,
    pub languages: Vec<String>,
    pub max_load: i32,
    pub current_load: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = business_units)]
pub struct BusinessUnit {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_assignment)]
pub struct TicketAssignment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub manager_id: Uuid,
    pub business_unit_id: Uuid,
    pub office_id: Uuid,
    pub routing_bucket: String,
    pub routing_reason: Option<String>,
    pub is_current: bool,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = rr_pointer)]
pub struct RrPointer {
    pub id: Uuid,
    pub business_unit_id: Uuid,
    pub skill_group: String,
    pub last_manager_idx: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = audit_log)]
pub struct AuditLog {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub step: String,
    pub input_data: Option<serde_json::Value>,
    pub output_data: Option<serde_json::Value>,
    pub decision: String,
    pub candidates: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Manager joined with its office, as exposed by the read API.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerWithOffice {
    #[serde(flatten)]
    pub manager: Manager,
    pub office_name: String,
    pub office_city: String,
    pub office_lat: Option<f64>,
    pub office_lon: Option<f64>,
    pub utilization_pct: f64,
}

impl ManagerWithOffice {
    pub fn new(manager: Manager, office: &BusinessUnit) -> Self {
        let utilization_pct = if manager.max_load > 0 {
            f64::from(manager.current_load) / f64::from(manager.max_load) * 100.0
        } else {
            0.0
        };
        Self {
            office_name: office.name.clone(),
            office_city: office.city.clone(),
            office_lat: office.lat,
            office_lon: office.lon,
            utilization_pct,
            manager,
        }
    }
}

/// Full ticket view. Entities are aggregated by id; there is no
/// back-pointer from Manager to its assignments.
#[derive(Debug, Serialize)]
pub struct TicketWithDetails {
    pub ticket: Ticket,
    pub ai: Option<TicketAi>,
    pub assignment: Option<TicketAssignment>,
    pub assigned_manager: Option<ManagerWithOffice>,
    pub geo_city: Option<String>,
    pub distance_km: Option<f64>,
    pub audit_trail: Vec<AuditLog>,
}
