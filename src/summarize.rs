//! Client for the external summarizer backend used by deep search.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

use crate::config::SummarizeConfig;

/// A summary containing this marker means the model judged the content
/// irrelevant to the query; the candidate is dropped from the output.
pub const DELETE_MARKER: &str = "@@DELETE@@";

pub struct Summarizer {
    client: reqwest::Client,
    config: SummarizeConfig,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(client: reqwest::Client, config: SummarizeConfig, timeout_secs: u64) -> Self {
        Self {
            client,
            config,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Summarize `text` with respect to `query` via a single
    /// non-streaming generate call.
    pub async fn summarize(&self, text: &str, query: &str) -> Result<String> {
        let prompt = build_prompt(&self.config.prompt_template, query, text);

        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "options": {
                "temperature": 0,
                "top_p": 0.9,
                "top_k": 40,
                "repeat_penalty": 1.1
            },
            "stream": false
        });

        let resp = self
            .client
            .post(&self.config.base_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to call summarizer backend")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("summarizer backend returned {status}: {body}");
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse summarizer response")?;

        Ok(json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

fn build_prompt(template: &str, query: &str, fulltext: &str) -> String {
    template
        .replace("%%query%%", query)
        .replace("%%fulltext%%", fulltext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_fills_both_slots() {
        let prompt = build_prompt(
            "Q: %%query%%\nT: %%fulltext%%",
            "refund policy",
            "full document text",
        );
        assert_eq!(prompt, "Q: refund policy\nT: full document text");
    }

    #[test]
    fn test_build_prompt_replaces_repeated_slots() {
        let prompt = build_prompt("%%query%% / %%query%%", "a", "unused");
        assert_eq!(prompt, "a / a");
    }

    #[test]
    fn test_delete_marker_detection() {
        let summary = "The content is unrelated. @@DELETE@@";
        assert!(summary.contains(DELETE_MARKER));
        assert!(!"a normal summary".contains(DELETE_MARKER));
    }
}
