//! Four-stage routing funnel: geo → skill → load → round-robin.
//!
//! The first three stages are pure filters over data loaded up front;
//! only the final stage mutates state, inside a single transaction, so
//! a routing failure leaves the ticket `enriched` and retryable.

pub mod geo_filter;
pub mod load_balancer;
pub mod round_robin;
pub mod skill_filter;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::AuditWriter;
use crate::events::{EventHub, TicketEvent};
use crate::shared::models::{
    BusinessUnit, Manager, Ticket, TicketAi, AUDIT_STEP_GEO_FILTER, AUDIT_STEP_LOAD_BALANCE,
    AUDIT_STEP_ROUND_ROBIN, AUDIT_STEP_SKILL_FILTER,
};
use crate::shared::schema::{business_units, managers, tickets};
use crate::shared::utils::DbPool;

pub use geo_filter::{choose_office, GeoDecision};
pub use load_balancer::{pick_finalists, LoadDecision};
pub use round_robin::RrDecision;
pub use skill_filter::{filter_skills, SkillDecision};

#[derive(Clone)]
pub struct RoutingService {
    pool: DbPool,
    audit: AuditWriter,
    events: Arc<EventHub>,
}

impl RoutingService {
    pub fn new(pool: DbPool, audit: AuditWriter, events: Arc<EventHub>) -> Self {
        Self { pool, audit, events }
    }

    /// Run the full funnel for a non-spam ticket with a written AI row.
    pub fn route_ticket(&self, ticket: &Ticket, ai: &TicketAi) -> Result<RrDecision> {
        let mut conn = self.pool.get().context("routing: no db connection")?;

        // Stage 1: geo filter.
        let offices = business_units::table
            .order(business_units::name.asc())
            .load::<BusinessUnit>(&mut conn)
            .context("load business units")?;
        let geo = choose_office(ticket.id, ai.lat, ai.lon, &ai.geo_status, &offices)?;
        self.audit
            .write(ticket.id, AUDIT_STEP_GEO_FILTER, &geo, &geo.decision);

        // Stage 2: skill filter over the office's active managers,
        // falling back to every active manager for empty offices.
        let mut candidates = managers::table
            .filter(managers::business_unit_id.eq(geo.business_unit_id))
            .filter(managers::is_active.eq(true))
            .order(managers::current_load.asc())
            .load::<Manager>(&mut conn)
            .context("load office managers")?;
        if candidates.is_empty() {
            candidates = managers::table
                .filter(managers::is_active.eq(true))
                .order(managers::current_load.asc())
                .load::<Manager>(&mut conn)
                .context("load all active managers")?;
        }

        let skill = filter_skills(
            candidates,
            ticket.client_segment.as_deref(),
            ai.ticket_type.as_deref(),
            &ai.lang,
        );
        let candidate_ids: Vec<Uuid> = skill.candidates.iter().map(|m| m.id).collect();
        self.audit.write_with_candidates(
            ticket.id,
            AUDIT_STEP_SKILL_FILTER,
            &skill,
            &skill.decision,
            &candidate_ids,
        );

        // Stage 3: load balancer.
        let load = pick_finalists(&skill.candidates);
        let finalist_ids: Vec<Uuid> = load.finalists.iter().map(|m| m.id).collect();
        self.audit.write_with_candidates(
            ticket.id,
            AUDIT_STEP_LOAD_BALANCE,
            &load,
            &load.decision,
            &finalist_ids,
        );

        if load.finalists.is_empty() {
            bail!("no candidates after load balancing");
        }

        // Stage 4: transactional round-robin commit.
        let routing_reason = format!(
            "Geo: {} | Skills: {} | Load: {}",
            geo.decision, skill.decision, load.decision
        );

        let rr = conn.transaction::<RrDecision, anyhow::Error, _>(|conn| {
            let rr = round_robin::assign(
                conn,
                ticket.id,
                geo.business_unit_id,
                &skill.skill_group,
                &load.finalists,
                &routing_reason,
            )?;

            diesel::update(tickets::table.find(ticket.id))
                .set((
                    tickets::status.eq("routed"),
                    tickets::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            Ok(rr)
        })?;

        self.audit.write_with_candidates(
            ticket.id,
            AUDIT_STEP_ROUND_ROBIN,
            &rr,
            &rr.decision,
            &[rr.manager_id],
        );

        info!(
            "ticket {} routed to {} ({})",
            ticket.id, rr.manager_name, skill.skill_group
        );
        self.events.broadcast(
            &TicketEvent::ticket_update(ticket.id, "routed").with_manager(&rr.manager_name),
        );

        Ok(rr)
    }
}
