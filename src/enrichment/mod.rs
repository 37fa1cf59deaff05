//! Hybrid ticket enrichment.
//!
//! Phase 1 writes the deterministic baseline and marks the ticket
//! `enriched`; from that commit point no later failure can lose
//! classifier output. Phase 2 asks the LLM; phase 3 merges the overlay
//! under a fixed trust policy and hands off to routing. Spam skips
//! routing entirely.

pub mod llm;

use anyhow::{Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use log::{error, info, warn};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::audit::AuditWriter;
use crate::classifier::{classify_ticket, Baseline, TYPE_SPAM};
use crate::events::{EventHub, TicketEvent};
use crate::geo::{resolve_city, GEO_UNKNOWN};
use crate::routing::RoutingService;
use crate::shared::models::{Ticket, TicketAi, AUDIT_STEP_AI_ENRICH};
use crate::shared::schema::{ticket_ai, tickets};
use crate::shared::utils::DbPool;

use llm::{resolve_image_paths, LlmProvider, LlmVerdict};

pub struct EnrichmentService {
    pool: DbPool,
    llm: Arc<dyn LlmProvider>,
    routing: RoutingService,
    audit: AuditWriter,
    events: Arc<EventHub>,
    images_dir: String,
    in_flight: AtomicUsize,
}

impl EnrichmentService {
    pub fn new(
        pool: DbPool,
        llm: Arc<dyn LlmProvider>,
        routing: RoutingService,
        audit: AuditWriter,
        events: Arc<EventHub>,
        images_dir: String,
    ) -> Self {
        Self {
            pool,
            llm,
            routing,
            audit,
            events,
            images_dir,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Run enrichment on a detached task. The task is not tied to any
    /// request, so a disconnecting client cannot orphan a half-written
    /// AI row; shutdown drains the in-flight counter instead.
    pub fn spawn(self: &Arc<Self>, ticket_id: Uuid) {
        let svc = Arc::clone(self);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if let Err(e) = svc.enrich_ticket(ticket_id).await {
                error!("enrichment failed for ticket {}: {:#}", ticket_id, e);
                svc.events
                    .broadcast(&TicketEvent::ticket_update(ticket_id, "error"));
            }
            svc.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Enrich and route one ticket. Idempotent: the AI row is upserted
    /// by ticket id and routing re-uses an existing assignment.
    pub async fn enrich_ticket(&self, ticket_id: Uuid) -> Result<()> {
        let started = Instant::now();

        let ticket = self.load_ticket(ticket_id)?;

        // Phase 1: deterministic baseline, instant and infallible.
        let baseline = classify_ticket(&ticket);

        self.audit.write_full(
            ticket_id,
            AUDIT_STEP_AI_ENRICH,
            &json!({
                "subject": ticket.subject,
                "client_segment": ticket.client_segment,
                "lang_hint": baseline.lang,
            }),
            &baseline,
            &format!(
                "Deterministic baseline: type={}, priority={}",
                baseline.ticket_type, baseline.priority_1_10
            ),
        );

        self.set_status(ticket_id, "enriching");
        self.events
            .broadcast(&TicketEvent::ticket_update(ticket_id, "enriching"));

        let (lat, lon, geo_status) = match baseline.geo_city.as_deref() {
            Some(city) if !city.is_empty() => resolve_city(city),
            _ => (None, None, GEO_UNKNOWN),
        };

        let ai_id = Uuid::new_v4();
        let mut ai = baseline_to_ai(ai_id, ticket_id, &baseline, lat, lon, geo_status);
        self.upsert_ai(&ai).context("save baseline enrichment")?;

        self.set_status(ticket_id, "enriched");
        self.events
            .broadcast(&TicketEvent::ticket_update(ticket_id, "enriched"));
        info!(
            "ticket {} baseline saved: type={} lang={}",
            ticket_id, baseline.ticket_type, baseline.lang
        );

        // Phase 2: the LLM may fail; the baseline already stands.
        let user_message = build_user_message(&ticket);
        let images = resolve_image_paths(ticket.attachments.as_deref(), &self.images_dir);
        if !images.is_empty() {
            info!("ticket {} has {} image attachments, using vision request", ticket_id, images.len());
        }

        let verdict = match self.llm.classify(&user_message, &images).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("llm failed for ticket {}, baseline stands: {:#}", ticket_id, e);

                ai.processing_ms = Some(started.elapsed().as_millis() as i32);
                let _ = self.upsert_ai(&ai);
                self.audit.write(
                    ticket_id,
                    AUDIT_STEP_AI_ENRICH,
                    &json!({ "mode": "deterministic_only" }),
                    "LLM unavailable — deterministic baseline stands",
                );

                self.finish(&ticket, &ai, &baseline.ticket_type);
                return Ok(());
            }
        };

        // Phase 3: merge and persist.
        let merged = merge_results(&baseline, &verdict);

        let geo_city = merged.geo_city.clone().or_else(|| baseline.geo_city.clone());
        let (lat, lon, geo_status) = match geo_city.as_deref() {
            Some(city) if !city.is_empty() => resolve_city(city),
            _ => (None, None, GEO_UNKNOWN),
        };

        let processing_ms = started.elapsed().as_millis() as i32;
        let merged_ai = TicketAi {
            id: ai_id,
            ticket_id,
            ticket_type: Some(merged.ticket_type.clone()),
            sentiment: Some(merged.sentiment.clone()),
            priority_1_10: Some(merged.priority_1_10),
            lang: merged.lang.clone(),
            summary: Some(merged.summary.clone()),
            recommended_actions: serde_json::to_value(&merged.recommended_actions)
                .unwrap_or_else(|_| json!([])),
            lat,
            lon,
            geo_status: geo_status.to_string(),
            confidence_type: Some(merged.confidence_type),
            confidence_sentiment: Some(merged.confidence_sentiment),
            confidence_priority: Some(merged.confidence_priority),
            processing_ms: Some(processing_ms),
            enriched_at: Some(Utc::now()),
            created_at: Utc::now(),
        };

        self.upsert_ai(&merged_ai).context("save merged enrichment")?;
        self.audit.write(
            ticket_id,
            AUDIT_STEP_AI_ENRICH,
            &json!({ "mode": "hybrid", "processing_ms": processing_ms }),
            &format!(
                "Hybrid enrichment: type={}, sentiment={}, priority={}",
                merged.ticket_type, merged.sentiment, merged.priority_1_10
            ),
        );
        info!(
            "ticket {} enriched (hybrid): type={} sentiment={} in {} ms",
            ticket_id, merged.ticket_type, merged.sentiment, processing_ms
        );

        self.finish(&ticket, &merged_ai, &merged.ticket_type);
        Ok(())
    }

    /// Spam goes straight to `routed` with no assignment; everything
    /// else enters the routing funnel. Routing failures are logged and
    /// leave the ticket `enriched` for a later retry.
    fn finish(&self, ticket: &Ticket, ai: &TicketAi, ticket_type: &str) {
        if ticket_type == TYPE_SPAM {
            self.set_status(ticket.id, "routed");
            self.events
                .broadcast(&TicketEvent::ticket_update(ticket.id, "routed"));
            return;
        }

        if let Err(e) = self.routing.route_ticket(ticket, ai) {
            error!("routing failed for ticket {}: {:#}", ticket.id, e);
        }
    }

    fn load_ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        let mut conn = self.pool.get().context("enrichment: no db connection")?;
        tickets::table
            .find(ticket_id)
            .first::<Ticket>(&mut conn)
            .with_context(|| format!("ticket {} not found", ticket_id))
    }

    fn upsert_ai(&self, ai: &TicketAi) -> Result<()> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(ticket_ai::table)
            .values(ai)
            .on_conflict(ticket_ai::ticket_id)
            .do_update()
            .set((
                ticket_ai::ticket_type.eq(&ai.ticket_type),
                ticket_ai::sentiment.eq(&ai.sentiment),
                ticket_ai::priority_1_10.eq(ai.priority_1_10),
                ticket_ai::lang.eq(&ai.lang),
                ticket_ai::summary.eq(&ai.summary),
                ticket_ai::recommended_actions.eq(&ai.recommended_actions),
                ticket_ai::lat.eq(ai.lat),
                ticket_ai::lon.eq(ai.lon),
                ticket_ai::geo_status.eq(&ai.geo_status),
                ticket_ai::confidence_type.eq(ai.confidence_type),
                ticket_ai::confidence_sentiment.eq(ai.confidence_sentiment),
                ticket_ai::confidence_priority.eq(ai.confidence_priority),
                ticket_ai::processing_ms.eq(ai.processing_ms),
                ticket_ai::enriched_at.eq(ai.enriched_at),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    /// Status writes are best-effort: a lost transient marker must not
    /// abort the pipeline.
    fn set_status(&self, ticket_id: Uuid, status: &str) {
        let result = self.pool.get().map_err(anyhow::Error::from).and_then(|mut conn| {
            diesel::update(tickets::table.find(ticket_id))
                .set((tickets::status.eq(status), tickets::updated_at.eq(Utc::now())))
                .execute(&mut conn)
                .map_err(anyhow::Error::from)
        });
        if let Err(e) = result {
            warn!("status update '{}' failed for ticket {}: {}", status, ticket_id, e);
        }
    }
}

fn baseline_to_ai(
    ai_id: Uuid,
    ticket_id: Uuid,
    baseline: &Baseline,
    lat: Option<f64>,
    lon: Option<f64>,
    geo_status: &str,
) -> TicketAi {
    TicketAi {
        id: ai_id,
        ticket_id,
        ticket_type: Some(baseline.ticket_type.clone()),
        sentiment: Some(baseline.sentiment.clone()),
        priority_1_10: Some(baseline.priority_1_10),
        lang: baseline.lang.clone(),
        summary: Some(baseline.summary.clone()),
        recommended_actions: serde_json::to_value(&baseline.recommended_actions)
            .unwrap_or_else(|_| json!([])),
        lat,
        lon,
        geo_status: geo_status.to_string(),
        confidence_type: Some(baseline.confidence_type),
        confidence_sentiment: Some(baseline.confidence_sentiment),
        confidence_priority: Some(baseline.confidence_priority),
        processing_ms: None,
        enriched_at: Some(Utc::now()),
        created_at: Utc::now(),
    }
}

/// User prompt with Russian field labels, mirroring what agents see.
pub fn build_user_message(ticket: &Ticket) -> String {
    let mut msg = format!("Тема: {}\n\nОбращение: {}", ticket.subject, ticket.body);
    if let Some(name) = &ticket.client_name {
        msg.push_str(&format!("\n\nКлиент: {}", name));
    }
    if let Some(segment) = &ticket.client_segment {
        msg.push_str(&format!("\nСегмент: {}", segment));
    }
    if let Some(address) = &ticket.raw_address {
        msg.push_str(&format!("\nАдрес: {}", address));
    }
    if let Some(channel) = &ticket.source_channel {
        msg.push_str(&format!("\nКанал: {}", channel));
    }
    msg
}

/// Combine the deterministic baseline with the LLM overlay. The
/// overlay is the base of the merge; the baseline overrides exactly
/// where it is the more reliable signal.
pub fn merge_results(baseline: &Baseline, overlay: &LlmVerdict) -> LlmVerdict {
    let mut merged = overlay.clone();

    // Kazakh detection by unique letters is near-perfect.
    if baseline.lang == "KZ" {
        merged.lang = "KZ".to_string();
    }

    // Type: a confident baseline beats an unsure overlay.
    if overlay.confidence_type < 0.5 && baseline.confidence_type >= 0.6 {
        merged.ticket_type = baseline.ticket_type.clone();
        merged.confidence_type = baseline.confidence_type;
    }
    // Deterministic spam is trusted outright; the model misreads promo text.
    if baseline.ticket_type == TYPE_SPAM
        && baseline.confidence_type >= 0.65
        && overlay.ticket_type != TYPE_SPAM
    {
        merged.ticket_type = TYPE_SPAM.to_string();
        merged.confidence_type = baseline.confidence_type;
    }

    if overlay.confidence_sentiment < 0.5 && baseline.confidence_sentiment >= 0.6 {
        merged.sentiment = baseline.sentiment.clone();
        merged.confidence_sentiment = baseline.confidence_sentiment;
    }

    // Segment-derived priority is authoritative as a floor.
    if baseline.confidence_priority >= 0.85 && baseline.priority_1_10 > overlay.priority_1_10 {
        merged.priority_1_10 = baseline.priority_1_10;
    }
    if merged.ticket_type == TYPE_SPAM {
        merged.priority_1_10 = 1;
    }

    // Structured address data beats text mining.
    if baseline.geo_city.as_deref().is_some_and(|c| !c.is_empty()) {
        merged.geo_city = baseline.geo_city.clone();
    }

    // Summary and recommended actions: overlay always wins.

    merged
}
