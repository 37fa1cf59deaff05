use std::sync::Arc;

use axum::http::HeaderValue;
use log::{info, warn};
use tower_http::cors::{Any, CorsLayer};

use triageserver::enrichment::llm::OpenAiClient;
use triageserver::shared::config::AppConfig;
use triageserver::shared::state::AppState;
use triageserver::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    if config.llm.api_key.is_empty() {
        warn!("LLM_API_KEY not set; enrichment will run deterministic-only");
    }

    let pool = create_conn(&config.database_url)?;

    info!("running migrations...");
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    info!("migrations completed");

    let llm = Arc::new(OpenAiClient::new(
        config.llm.api_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
    ));

    let state = Arc::new(AppState::new(pool, config.clone(), llm));

    let cors = match config.cors_origins.as_str() {
        "*" => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        origins => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    let app = triageserver::api_router::configure_api_routes()
        .layer(cors)
        .with_state(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("server started on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Detached enrichment tasks get a bounded drain window.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while state.enrichment.in_flight() > 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    let remaining = state.enrichment.in_flight();
    if remaining > 0 {
        warn!("shutting down with {} enrichment tasks still running", remaining);
    }

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to install shutdown handler: {}", e);
        return;
    }
    info!("shutdown signal received, draining...");
}
