//! Gateway to the external embedding backends.
//!
//! Every backend speaks the same contract: `POST {model, input}` answered
//! by `{embeddings: [[float]]}`. An unreachable backend or a non-success
//! status yields `Ok(None)`, "embedding unavailable", which interactive
//! callers turn into a 500 and batch jobs count as a skipped failure. No
//! retries happen here; retry policy belongs to the orchestrator.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::{Config, EmbeddingEndpoint};
use crate::error::ApiError;
use crate::models::VectorField;

pub struct EmbeddingGateway {
    client: reqwest::Client,
    standard: EmbeddingEndpoint,
    fine_tuned: Option<EmbeddingEndpoint>,
    image: Option<EmbeddingEndpoint>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f64>>,
}

impl EmbeddingGateway {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            standard: config.embedding.clone(),
            fine_tuned: config.embedding_ft.clone(),
            image: config.image_embedding.clone(),
        }
    }

    /// Embed a text against the backend selected by `field`. Selecting the
    /// fine-tuned backend while it is unconfigured fails fast.
    pub async fn embed_text(
        &self,
        text: &str,
        field: VectorField,
    ) -> Result<Option<Vec<f64>>, ApiError> {
        let endpoint = match field {
            VectorField::Standard => &self.standard,
            VectorField::FineTuned => self
                .fine_tuned
                .as_ref()
                .ok_or(ApiError::EmbeddingNotConfigured("fine-tuned"))?,
        };
        Ok(self.post_embed(endpoint, text, None).await)
    }

    /// Embed raw image bytes (base64-encoded on the wire). The scope, when
    /// present, lets the backend pick a scope-specific model.
    pub async fn embed_image(
        &self,
        bytes: &[u8],
        scope: Option<&str>,
    ) -> Result<Option<Vec<f64>>, ApiError> {
        let endpoint = self
            .image
            .as_ref()
            .ok_or(ApiError::EmbeddingNotConfigured("image"))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(self.post_embed(endpoint, &encoded, scope).await)
    }

    async fn post_embed(
        &self,
        endpoint: &EmbeddingEndpoint,
        input: &str,
        scope: Option<&str>,
    ) -> Option<Vec<f64>> {
        let req = EmbedRequest {
            model: &endpoint.model,
            input,
            scope,
        };

        let resp = match self.client.post(&endpoint.base_url).json(&req).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("embedding backend {} unreachable: {e}", endpoint.base_url);
                return None;
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("embedding backend returned {status}: {body}");
            return None;
        }

        match resp.json::<EmbedResponse>().await {
            Ok(body) => body.embeddings.into_iter().next().filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!("failed to parse embedding response: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn gateway_without_optional_backends() -> EmbeddingGateway {
        EmbeddingGateway::new(reqwest::Client::new(), &Config::default())
    }

    #[tokio::test]
    async fn test_fine_tuned_unconfigured_fails_fast() {
        let gateway = gateway_without_optional_backends();
        let err = gateway.embed_text("hello", VectorField::FineTuned).await.unwrap_err();
        assert!(matches!(err, ApiError::EmbeddingNotConfigured("fine-tuned")));
    }

    #[tokio::test]
    async fn test_image_unconfigured_fails_fast() {
        let gateway = gateway_without_optional_backends();
        let err = gateway.embed_image(&[1, 2, 3], None).await.unwrap_err();
        assert!(matches!(err, ApiError::EmbeddingNotConfigured("image")));
    }

    #[test]
    fn test_embed_request_omits_absent_scope() {
        let req = EmbedRequest {
            model: "m",
            input: "text",
            scope: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("scope").is_none());
        assert_eq!(json["model"], "m");
        assert_eq!(json["input"], "text");
    }

    #[test]
    fn test_embed_response_takes_first_vector() {
        let body: EmbedResponse =
            serde_json::from_str(r#"{"embeddings":[[0.1,0.2],[0.9,0.8]]}"#).unwrap();
        let first = body.embeddings.into_iter().next().unwrap();
        assert_eq!(first, vec![0.1, 0.2]);
    }
}
