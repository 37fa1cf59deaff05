//! Append-only audit trail of every enrichment and routing decision.
//!
//! Writes go through their own pooled connection and never join the
//! routing transaction, so the trail stays visible for partially
//! failed pipelines. A failed audit write is logged and swallowed.

use chrono::Utc;
use diesel::prelude::*;
use log::error;
use serde::Serialize;
use uuid::Uuid;

use crate::shared::models::AuditLog;
use crate::shared::schema::audit_log;
use crate::shared::utils::DbPool;

#[derive(Clone)]
pub struct AuditWriter {
    pool: DbPool,
}

impl AuditWriter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn write<O: Serialize>(&self, ticket_id: Uuid, step: &str, output: &O, decision: &str) {
        self.insert(ticket_id, step, None, json_or_null(output), decision, None);
    }

    pub fn write_with_candidates<O: Serialize>(
        &self,
        ticket_id: Uuid,
        step: &str,
        output: &O,
        decision: &str,
        candidates: &[Uuid],
    ) {
        self.insert(
            ticket_id,
            step,
            None,
            json_or_null(output),
            decision,
            serde_json::to_value(candidates).ok(),
        );
    }

    pub fn write_full<I: Serialize, O: Serialize>(
        &self,
        ticket_id: Uuid,
        step: &str,
        input: &I,
        output: &O,
        decision: &str,
    ) {
        self.insert(
            ticket_id,
            step,
            json_or_null(input),
            json_or_null(output),
            decision,
            None,
        );
    }

    fn insert(
        &self,
        ticket_id: Uuid,
        step: &str,
        input_data: Option<serde_json::Value>,
        output_data: Option<serde_json::Value>,
        decision: &str,
        candidates: Option<serde_json::Value>,
    ) {
        let row = AuditLog {
            id: Uuid::new_v4(),
            ticket_id,
            step: step.to_string(),
            input_data,
            output_data,
            decision: decision.to_string(),
            candidates,
            created_at: Utc::now(),
        };

        let mut conn = match self.pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                error!("audit write skipped, no connection: {}", e);
                return;
            }
        };

        if let Err(e) = diesel::insert_into(audit_log::table)
            .values(&row)
            .execute(&mut conn)
        {
            error!("audit write failed for ticket {} step {}: {}", ticket_id, step, e);
        }
    }

    pub fn list_for_ticket(&self, ticket_id: Uuid) -> anyhow::Result<Vec<AuditLog>> {
        let mut conn = self.pool.get()?;
        let rows = audit_log::table
            .filter(audit_log::ticket_id.eq(ticket_id))
            .order(audit_log::created_at.asc())
            .load::<AuditLog>(&mut conn)?;
        Ok(rows)
    }
}

fn json_or_null<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}
