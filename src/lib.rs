//! # element-search
//!
//! A hybrid semantic retrieval and ranking service over an
//! Elasticsearch-backed index of knowledge "elements", orchestrating
//! external embedding, summarization, and configuration collaborators.
//!
//! ## Pipeline
//!
//! ```text
//!                       ┌──────────────┐
//!                       │  Query (+neg) │
//!                       └──────┬───────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         ┌────────────────┐      ┌────────────────┐
//!         │ Embed standard │      │ Embed fine-tuned│
//!         │  (POST embed)  │      │  (if requested) │
//!         └───────┬────────┘      └───────┬────────┘
//!                 │                       │
//!                 ▼                       ▼
//!         ┌─────────────────────────────────────┐
//!         │  Search index: lexical × (cos + 1)  │
//!         │  title ×2.0, body ×1.2, filtered by │
//!         │  scope + business visibility        │
//!         └──────────────────┬──────────────────┘
//!                            │
//!                            ▼
//!         ┌─────────────────────────────────────┐
//!         │  Merge by id · keep ≥ 0.65 × max    │
//!         │  (or PCA re-query / pos-neg groups) │
//!         └──────────────────┬──────────────────┘
//!                            │
//!                            ▼
//!         ┌─────────────────────────────────────┐
//!         │  Live-data enrichment per survivor  │
//!         │  fetch → validate → render          │
//!         └──────────────────┬──────────────────┘
//!                            │
//!                            ▼
//!         ┌─────────────────────────────────────┐
//!         │  Response: batch JSON array, or the │
//!         │  deep-search streamed array with    │
//!         │  LLM summaries                      │
//!         └─────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server and all collaborators
//! - [`models`] - Shared data types: `Element`, requests, response rows, vector-field selection
//! - [`error`] - Error taxonomy mapped to HTTP statuses
//! - [`embedding`] - Gateway to the standard / fine-tuned / image embedding backends
//! - [`summarize`] - Summarizer client used by deep search
//! - [`scopes`] - Configuration collaborator: scopes and per-business/per-user API keys
//! - [`search::backend`] - Elasticsearch adapter: hybrid, vector-only, collapse, and aggregation queries
//! - [`search::cosine`] - Exact cosine similarity, shared with client-side re-scoring
//! - [`search::pca`] - Principal component of a result sample for deepsense re-ranking
//! - [`search::merge`] - Merge/dedup/threshold rules and relevance percentages
//! - [`enrich`] - Live-data enrichment: fetch, sandboxed validation, templating
//! - [`api`] - Axum handlers for the query endpoints and the batch re-embedding job
//! - [`state`] - Shared application state wiring the collaborators together

pub mod api;
pub mod config;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod models;
pub mod scopes;
pub mod search;
pub mod state;
pub mod summarize;
