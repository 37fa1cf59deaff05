use anyhow::{bail, Result};
use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::shared::models::{Manager, RrPointer, TicketAssignment};
use crate::shared::schema::{managers, rr_pointer, ticket_assignment};

#[derive(Debug, Clone, Serialize)]
pub struct RrDecision {
    pub manager_id: Uuid,
    pub manager_name: String,
    pub decision: String,
    pub already_assigned: bool,
}

/// Next rotation index over `count` finalists; `last` is -1 for a
/// freshly created pointer.
pub fn next_index(last: i32, count: usize) -> usize {
    ((last + 1) as usize) % count
}

/// Transactional assignment. Must run inside the caller's transaction:
/// the row locks taken here serialize concurrent assignments per
/// (business unit, skill group) bucket.
pub fn assign(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    business_unit_id: Uuid,
    skill_group: &str,
    finalists: &[Manager],
    routing_reason: &str,
) -> Result<RrDecision> {
    // Idempotency: a ticket that already has a live assignment keeps
    // it. No load increment, no pointer advance.
    let existing: Option<Uuid> = ticket_assignment::table
        .filter(ticket_assignment::ticket_id.eq(ticket_id))
        .filter(ticket_assignment::is_current.eq(true))
        .select(ticket_assignment::manager_id)
        .for_update()
        .first::<Uuid>(conn)
        .optional()?;

    if let Some(manager_id) = existing {
        let manager_name = managers::table
            .find(manager_id)
            .select(managers::full_name)
            .first::<String>(conn)
            .unwrap_or_default();
        return Ok(RrDecision {
            manager_id,
            manager_name,
            decision: "Already assigned (reusing existing)".to_string(),
            already_assigned: true,
        });
    }

    if finalists.is_empty() {
        bail!("no finalists for round robin");
    }

    let (selected, decision) = if finalists.len() == 1 {
        let selected = &finalists[0];
        (
            selected,
            format!("Single candidate — assigned to {}", selected.full_name),
        )
    } else {
        let idx = advance_pointer(conn, business_unit_id, skill_group, finalists.len())?;
        let selected = &finalists[idx];
        (
            selected,
            format!("Round-robin index={} → assigned to {}", idx, selected.full_name),
        )
    };

    let now = Utc::now();
    let assignment = TicketAssignment {
        id: Uuid::new_v4(),
        ticket_id,
        manager_id: selected.id,
        business_unit_id,
        office_id: business_unit_id,
        routing_bucket: skill_group.to_string(),
        routing_reason: Some(routing_reason.to_string()),
        is_current: true,
        assigned_at: now,
    };

    diesel::insert_into(ticket_assignment::table)
        .values(&assignment)
        .on_conflict(ticket_assignment::ticket_id)
        .filter_target(ticket_assignment::is_current.eq(true))
        .do_update()
        .set((
            ticket_assignment::manager_id.eq(assignment.manager_id),
            ticket_assignment::business_unit_id.eq(assignment.business_unit_id),
            ticket_assignment::office_id.eq(assignment.office_id),
            ticket_assignment::routing_bucket.eq(&assignment.routing_bucket),
            ticket_assignment::routing_reason.eq(&assignment.routing_reason),
            ticket_assignment::assigned_at.eq(now),
        ))
        .execute(conn)?;

    diesel::update(managers::table.find(selected.id))
        .set(managers::current_load.eq(managers::current_load + 1))
        .execute(conn)?;

    Ok(RrDecision {
        manager_id: selected.id,
        manager_name: selected.full_name.clone(),
        decision,
        already_assigned: false,
    })
}

/// Lock the pointer row for this (business unit, skill group) bucket
/// and rotate it. A missing row is created at index 0 and treated as
/// having pointed at -1, so the first pick lands on index 0.
fn advance_pointer(
    conn: &mut PgConnection,
    business_unit_id: Uuid,
    skill_group: &str,
    finalist_count: usize,
) -> Result<usize> {
    let last: Option<i32> = rr_pointer::table
        .filter(rr_pointer::business_unit_id.eq(business_unit_id))
        .filter(rr_pointer::skill_group.eq(skill_group))
        .select(rr_pointer::last_manager_idx)
        .for_update()
        .first::<i32>(conn)
        .optional()?;

    let last = match last {
        Some(idx) => idx,
        None => {
            diesel::insert_into(rr_pointer::table)
                .values(&RrPointer {
                    id: Uuid::new_v4(),
                    business_unit_id,
                    skill_group: skill_group.to_string(),
                    last_manager_idx: 0,
                    updated_at: Utc::now(),
                })
                .execute(conn)?;
            -1
        }
    };

    let next = next_index(last, finalist_count);

    diesel::update(
        rr_pointer::table
            .filter(rr_pointer::business_unit_id.eq(business_unit_id))
            .filter(rr_pointer::skill_group.eq(skill_group)),
    )
    .set((
        rr_pointer::last_manager_idx.eq(next as i32),
        rr_pointer::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_index_rotates_contiguously() {
        // Fresh pointer starts at -1, so the rotation covers every
        // index before repeating any.
        let mut last = -1;
        let mut seen = Vec::new();
        for _ in 0..4 {
            let next = next_index(last, 2);
            seen.push(next);
            last = next as i32;
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_next_index_stays_in_bounds_when_pool_shrinks() {
        // Pointer left at 3 by a larger pool, now only 2 finalists.
        let next = next_index(3, 2);
        assert!(next < 2);
        assert_eq!(next, 0);
    }
}
