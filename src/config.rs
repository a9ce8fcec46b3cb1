use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Search index (Elasticsearch-compatible) base URL
    pub elastic_base_url: String,
    /// Standard text-embedding backend
    pub embedding: EmbeddingEndpoint,
    /// Fine-tuned text-embedding backend; selecting it while unset is a
    /// configuration error
    pub embedding_ft: Option<EmbeddingEndpoint>,
    /// Image-embedding backend
    pub image_embedding: Option<EmbeddingEndpoint>,
    /// Summarizer backend used by deep search
    pub summarize: SummarizeConfig,
    /// Configuration collaborator (scopes and API-key lookups)
    pub config_service_url: String,
    /// Per-request timeout for best-effort live-data fetches
    pub live_data_timeout_secs: u64,
    /// Per-request timeout for summarizer calls
    pub summarize_timeout_secs: u64,
    /// Bounded concurrency for deep-search level-2 expansion
    pub deep_search_fanout: usize,
}

/// One embedding backend: a URL accepting `{model, input}` and answering
/// `{embeddings: [[float]]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingEndpoint {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    pub base_url: String,
    pub model: String,
    /// Prompt with `%%query%%` and `%%fulltext%%` slots. Must instruct the
    /// model to answer the deletion marker for irrelevant content.
    pub prompt_template: String,
}

const DEFAULT_PROMPT_TEMPLATE: &str = "Summarize the following content strictly as it relates \
     to the question \"%%query%%\". Reply with only the summary. If the content has no bearing \
     on the question, reply with exactly @@DELETE@@.\n\n%%fulltext%%";

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            elastic_base_url: "http://localhost:9200".to_string(),
            embedding: EmbeddingEndpoint {
                base_url: "http://localhost:11434/api/embed".to_string(),
                model: "mxbai-embed-large".to_string(),
            },
            embedding_ft: None,
            image_embedding: None,
            summarize: SummarizeConfig {
                base_url: "http://localhost:11434/api/generate".to_string(),
                model: "llama3.2".to_string(),
                prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            },
            config_service_url: "http://localhost:9100".to_string(),
            live_data_timeout_secs: 10,
            summarize_timeout_secs: 120,
            deep_search_fanout: 4,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("ELEMENT_SEARCH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("ELASTIC_BASE_URL") {
            config.elastic_base_url = url;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        config.embedding_ft = endpoint_from_env("EMBEDDING_FT_BASE_URL", "EMBEDDING_FT_MODEL");
        config.image_embedding =
            endpoint_from_env("IMAGE_EMBEDDING_BASE_URL", "IMAGE_EMBEDDING_MODEL");
        if let Ok(url) = std::env::var("SUMMARIZE_BASE_URL") {
            config.summarize.base_url = url;
        }
        if let Ok(model) = std::env::var("SUMMARIZE_MODEL") {
            config.summarize.model = model;
        }
        if let Ok(template) = std::env::var("SUMMARIZE_PROMPT_TEMPLATE") {
            config.summarize.prompt_template = template;
        }
        if let Ok(url) = std::env::var("CONFIG_SERVICE_BASE_URL") {
            config.config_service_url = url;
        }
        if let Ok(val) = std::env::var("LIVE_DATA_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.live_data_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("SUMMARIZE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.summarize_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("DEEP_SEARCH_FANOUT") {
            if let Ok(v) = val.parse::<usize>() {
                config.deep_search_fanout = v.max(1);
            }
        }

        config
    }
}

/// Both variables must be set for the endpoint to exist; a half-configured
/// backend is treated as absent.
fn endpoint_from_env(url_var: &str, model_var: &str) -> Option<EmbeddingEndpoint> {
    match (std::env::var(url_var), std::env::var(model_var)) {
        (Ok(base_url), Ok(model)) if !base_url.is_empty() && !model.is_empty() => {
            Some(EmbeddingEndpoint { base_url, model })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_template_has_slots_and_marker() {
        let config = Config::default();
        assert!(config.summarize.prompt_template.contains("%%query%%"));
        assert!(config.summarize.prompt_template.contains("%%fulltext%%"));
        assert!(config.summarize.prompt_template.contains("@@DELETE@@"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.embedding_ft.is_none());
        assert_eq!(config.deep_search_fanout, 4);
        assert_eq!(config.live_data_timeout_secs, 10);
    }
}
