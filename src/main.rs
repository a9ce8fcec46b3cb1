use axum::routing::{get, post};
use axum::{Json, Router};
use tracing_subscriber::EnvFilter;

use element_search::api;
use element_search::config::Config;
use element_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Search index: {}", config.elastic_base_url);
    tracing::info!(
        "Embedding backend: {} ({})",
        config.embedding.base_url,
        config.embedding.model
    );
    match &config.embedding_ft {
        Some(ft) => tracing::info!("Fine-tuned embedding backend: {} ({})", ft.base_url, ft.model),
        None => tracing::info!("Fine-tuned embedding backend: not configured"),
    }
    tracing::info!("Summarizer: {} ({})", config.summarize.base_url, config.summarize.model);

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;

    let app = Router::new()
        .route("/status", get(status))
        .route("/query/search", post(api::query::search))
        .route("/query/deepsearch", post(api::query::deep_search))
        .route("/query/deepsense", post(api::query::deepsense))
        .route("/query/searchaggregate", post(api::query::search_aggregate))
        .route("/query/searchimage", post(api::query::search_image))
        .route("/query/element/{id}", get(api::query::element_by_id))
        .route("/embeddings/batch", post(api::batch::reembed))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn status() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
