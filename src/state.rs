use std::sync::Arc;

use crate::config::Config;
use crate::embedding::EmbeddingGateway;
use crate::enrich::Enricher;
use crate::scopes::{ConfigProvider, HttpConfigService};
use crate::search::backend::SearchBackend;
use crate::summarize::Summarizer;

/// Shared application state. Everything here is immutable after startup;
/// all per-request state (candidate lists, dedup sets, score accumulators)
/// lives on the handler stack.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<SearchBackend>,
    pub embeddings: Arc<EmbeddingGateway>,
    pub summarizer: Arc<Summarizer>,
    pub enricher: Arc<Enricher>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let backend = SearchBackend::new(http_client.clone(), config.elastic_base_url.clone());
        let embeddings = EmbeddingGateway::new(http_client.clone(), &config);
        let summarizer = Summarizer::new(
            http_client.clone(),
            config.summarize.clone(),
            config.summarize_timeout_secs,
        );
        let scopes: Arc<dyn ConfigProvider> = Arc::new(HttpConfigService::new(
            http_client.clone(),
            config.config_service_url.clone(),
        ));
        let enricher = Enricher::new(http_client, scopes, config.live_data_timeout_secs);

        Ok(Self {
            config: Arc::new(config),
            backend: Arc::new(backend),
            embeddings: Arc::new(embeddings),
            summarizer: Arc::new(summarizer),
            enricher: Arc::new(enricher),
        })
    }
}
