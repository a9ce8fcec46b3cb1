//! Client for the configuration collaborator that owns scopes and
//! per-business / per-user API keys. Read-only from this service's point
//! of view.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::EmbeddingMode;

/// How live-data requests for a scope are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LiveAuthType {
    #[default]
    None,
    Business,
    User,
}

/// Scope configuration as served by the collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
    pub scope_id: String,
    #[serde(default)]
    pub live_auth_type: LiveAuthType,
    #[serde(default)]
    pub live_auth_method: Option<String>,
    /// Default embedding mode used when indexing elements of this scope.
    #[serde(default)]
    pub embedding: Option<EmbeddingMode>,
}

/// A resolved API key for (businessId, scopeId) or (userId, scopeId).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredential {
    pub api_key: String,
}

/// Lookup seam over the configuration collaborator. A trait so the
/// enrichment pipeline can be exercised without a network.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn scope_by_id(&self, scope_id: &str) -> anyhow::Result<Option<ScopeConfig>>;
    async fn business_auth(
        &self,
        business_id: &str,
        scope_id: &str,
    ) -> anyhow::Result<Option<AuthCredential>>;
    async fn user_auth(
        &self,
        user_id: &str,
        scope_id: &str,
    ) -> anyhow::Result<Option<AuthCredential>>;
}

/// HTTP implementation against the collaborator's REST surface.
pub struct HttpConfigService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConfigService {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn get_optional<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
    ) -> anyhow::Result<Option<T>> {
        let resp = self.client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("configuration service returned {} for {url}", resp.status());
        }
        Ok(Some(resp.json().await?))
    }
}

#[async_trait]
impl ConfigProvider for HttpConfigService {
    async fn scope_by_id(&self, scope_id: &str) -> anyhow::Result<Option<ScopeConfig>> {
        self.get_optional(format!("{}/scopes/{scope_id}", self.base_url)).await
    }

    async fn business_auth(
        &self,
        business_id: &str,
        scope_id: &str,
    ) -> anyhow::Result<Option<AuthCredential>> {
        self.get_optional(format!(
            "{}/auth/business/{business_id}/{scope_id}",
            self.base_url
        ))
        .await
    }

    async fn user_auth(
        &self,
        user_id: &str,
        scope_id: &str,
    ) -> anyhow::Result<Option<AuthCredential>> {
        self.get_optional(format!("{}/auth/user/{user_id}/{scope_id}", self.base_url))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_config_deserializes_auth_types() {
        let scope: ScopeConfig = serde_json::from_str(
            r#"{"scopeId":"support","liveAuthType":"business","liveAuthMethod":"bearer"}"#,
        )
        .unwrap();
        assert_eq!(scope.live_auth_type, LiveAuthType::Business);

        let scope: ScopeConfig = serde_json::from_str(r#"{"scopeId":"public"}"#).unwrap();
        assert_eq!(scope.live_auth_type, LiveAuthType::None);
        assert!(scope.embedding.is_none());
    }

    #[test]
    fn test_scope_config_embedding_mode() {
        let scope: ScopeConfig =
            serde_json::from_str(r#"{"scopeId":"s","embedding":"fine-tuned"}"#).unwrap();
        assert_eq!(scope.embedding, Some(EmbeddingMode::FineTuned));
    }
}
