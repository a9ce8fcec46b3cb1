//! Live-data enrichment: per-candidate fetch → validate → render.
//!
//! Every stage is a hard gate except the network fetch (best-effort: a
//! failure just means no live data) and the template render (degrades to
//! an absent fragment, never drops the candidate). A false or failing
//! validation expression excludes the candidate entirely: that is the
//! tenant's stated intent, not an error.

pub mod expr;
pub mod template;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::enrich::expr::Expr;
use crate::enrich::template::Template;
use crate::models::Element;
use crate::scopes::{ConfigProvider, LiveAuthType};

/// Outcome of enriching one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment {
    /// Candidate survives; `live_fragment` carries the rendered live text
    /// when one was produced.
    Kept { live_fragment: Option<String> },
    /// Candidate rejected by its validation expression.
    Excluded,
}

pub struct Enricher {
    client: reqwest::Client,
    scopes: Arc<dyn ConfigProvider>,
    live_data_timeout: Duration,
}

impl Enricher {
    pub fn new(
        client: reqwest::Client,
        scopes: Arc<dyn ConfigProvider>,
        live_data_timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            scopes,
            live_data_timeout: Duration::from_secs(live_data_timeout_secs),
        }
    }

    pub async fn enrich(
        &self,
        element: &Element,
        business_id: &str,
        user_id: &str,
    ) -> Enrichment {
        let token = self.resolve_token(element, business_id, user_id).await;

        let live_data = match element.live_data_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                self.fetch_live_data(url, token.as_deref()).await
            }
            _ => None,
        };

        if let (Some(live_data), Some(validation)) =
            (live_data.as_ref(), element.live_data_validation.as_deref())
        {
            if !validation.trim().is_empty() && !passes_validation(validation, live_data) {
                return Enrichment::Excluded;
            }
        }

        let live_fragment = match (live_data.as_ref(), element.live_data_template.as_deref()) {
            (Some(live_data), Some(template)) if !template.trim().is_empty() => {
                render_fragment(template, live_data)
            }
            _ => None,
        };

        Enrichment::Kept { live_fragment }
    }

    /// API-key lookup driven by the scope's live-data auth type. Collaborator
    /// failures degrade to "no token"; the live fetch is best-effort anyway.
    async fn resolve_token(
        &self,
        element: &Element,
        business_id: &str,
        user_id: &str,
    ) -> Option<String> {
        let scope_config = match self.scopes.scope_by_id(&element.scope).await {
            Ok(config) => config?,
            Err(e) => {
                tracing::warn!("scope lookup failed for {}: {e}", element.scope);
                return None;
            }
        };

        let credential = match scope_config.live_auth_type {
            LiveAuthType::None => return None,
            LiveAuthType::Business => {
                self.scopes.business_auth(business_id, &element.scope).await
            }
            LiveAuthType::User => self.scopes.user_auth(user_id, &element.scope).await,
        };

        match credential {
            Ok(credential) => credential.map(|c| c.api_key),
            Err(e) => {
                tracing::warn!("credential lookup failed for {}: {e}", element.scope);
                None
            }
        }
    }

    /// Best-effort GET of the live-data resource; any failure is absorbed.
    async fn fetch_live_data(&self, url: &str, token: Option<&str>) -> Option<Value> {
        let mut request = self.client.get(url).timeout(self.live_data_timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!("live-data fetch failed for {url}: {e}");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!("live-data fetch for {url} returned {}", resp.status());
            return None;
        }
        match resp.json().await {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::debug!("live-data at {url} is not JSON: {e}");
                None
            }
        }
    }
}

/// Compile and evaluate a validation rule with the live JSON bound as
/// `model`. Any compile or evaluation failure rejects the candidate, the
/// same as an explicit `false`.
fn passes_validation(validation: &str, live_data: &Value) -> bool {
    let expr = match Expr::parse(validation) {
        Ok(expr) => expr,
        Err(e) => {
            tracing::debug!("validation expression rejected: {e}");
            return false;
        }
    };
    match expr.eval_bool(live_data) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::debug!("validation evaluation failed: {e}");
            false
        }
    }
}

/// Render the live fragment; failures leave the candidate without one.
fn render_fragment(template: &str, live_data: &Value) -> Option<String> {
    let compiled = match Template::parse(template) {
        Ok(t) => t,
        Err(e) => {
            tracing::debug!("live-data template rejected: {e}");
            return None;
        }
    };
    match compiled.render(live_data) {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            tracing::debug!("live-data template render failed: {e}");
            None
        }
    }
}
