use std::sync::Arc;

use crate::audit::AuditWriter;
use crate::enrichment::llm::LlmProvider;
use crate::enrichment::EnrichmentService;
use crate::events::EventHub;
use crate::routing::RoutingService;
use crate::shared::config::AppConfig;
use crate::shared::utils::DbPool;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub events: Arc<EventHub>,
    pub audit: AuditWriter,
    pub enrichment: Arc<EnrichmentService>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig, llm: Arc<dyn LlmProvider>) -> Self {
        let events = Arc::new(EventHub::new());
        let audit = AuditWriter::new(conn.clone());
        let routing = RoutingService::new(conn.clone(), audit.clone(), Arc::clone(&events));
        let enrichment = Arc::new(EnrichmentService::new(
            conn.clone(),
            llm,
            routing,
            audit.clone(),
            Arc::clone(&events),
            config.images_dir.clone(),
        ));

        Self {
            conn,
            config,
            events,
            audit,
            enrichment,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("config", &self.config.server)
            .field("subscribers", &self.events.subscriber_count())
            .finish_non_exhaustive()
    }
}
