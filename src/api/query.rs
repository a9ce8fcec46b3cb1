use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::models::{
    AggregatedGroup, DeepSearchItem, Element, ElementResponse, ImageSearchRow, QueryRequest,
    VectorField,
};
use crate::search::merge::{
    filter_by_relative_score, max_score_or_unit, merge_best_by_id, relevance_percent,
    ScoredElement, CLASSIC_SCORE_FLOOR,
};
use crate::search::pca::{principal_component, PcaError};
use crate::state::AppState;
use crate::summarize::DELETE_MARKER;

/// Deep search keeps level-1 hits within this fraction of the level max.
const DEEP_SCORE_FLOOR: f64 = 0.7;
/// Deepsense keeps hits of the PCA-refined pass within this fraction.
const DEEPSENSE_SCORE_FLOOR: f64 = 0.15;
/// Image search keeps hits within this fraction of the max.
const IMAGE_SCORE_FLOOR: f64 = 0.5;
/// How many prior hits feed the principal-component computation.
const DEEPSENSE_SAMPLE_SIZE: usize = 20;
/// Result size for collapse and aggregate queries.
const GROUP_RESULT_SIZE: usize = 20;

fn validate(req: &QueryRequest) -> Result<(), ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::Validation("Query cannot be empty".to_string()));
    }
    if req.business_id.trim().is_empty() {
        return Err(ApiError::Validation("BusinessId is required".to_string()));
    }
    if req.user_id.trim().is_empty() {
        return Err(ApiError::Validation("UserId is required".to_string()));
    }
    Ok(())
}

/// Enrich one candidate and shape the response row. `None` means the
/// candidate was excluded by its live-data validation.
async fn process_element(
    state: &AppState,
    element: &Element,
    score: f64,
    max_score: f64,
    business_id: &str,
    user_id: &str,
) -> Option<ElementResponse> {
    match state.enricher.enrich(element, business_id, user_id).await {
        crate::enrich::Enrichment::Excluded => None,
        crate::enrich::Enrichment::Kept { live_fragment } => Some(ElementResponse {
            id: element.id.clone(),
            scope: element.scope.clone(),
            business_id: element.business_id.clone(),
            title: element.title.clone(),
            commands: element.commands.clone(),
            fulltext: element.fulltext.clone(),
            fulltext_live: live_fragment,
            relevance_score: relevance_percent(score, max_score),
        }),
    }
}

// ─── Classic search ──────────────────────────────────────

/// POST /query/search - classic hybrid pipeline:
///   1. Embed the query per requested mode (standard / fine-tuned / mixed,
///      issued concurrently for mixed)
///   2. One lexical+vector backend pass per embedding (concurrent)
///   3. Union, dedupe by id keeping the best score, drop < 0.65 × max
///   4. Live-data enrichment per survivor
/// A negative query or group flag switches to positive/negative collapse.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Vec<ElementResponse>>, ApiError> {
    validate(&req)?;

    if req.is_collapse_mode() {
        return collapse_search(&state, &req).await.map(Json);
    }

    let mode = req.mode();

    // ── Step 1: embeddings ───────────────────────────────
    let (standard, fine_tuned) = tokio::join!(
        async {
            if mode.wants_standard() {
                state.embeddings.embed_text(&req.query, VectorField::Standard).await
            } else {
                Ok(None)
            }
        },
        async {
            if mode.wants_fine_tuned() {
                state.embeddings.embed_text(&req.query, VectorField::FineTuned).await
            } else {
                Ok(None)
            }
        },
    );
    let (standard, fine_tuned) = (standard?, fine_tuned?);
    if standard.is_none() && fine_tuned.is_none() {
        return Err(ApiError::EmbeddingUnavailable);
    }

    // ── Step 2: backend passes ───────────────────────────
    let scope = req.scope.as_deref();
    let (standard_hits, fine_tuned_hits) = tokio::join!(
        async {
            match &standard {
                Some(vector) => {
                    state
                        .backend
                        .search_lexical_plus_vector(
                            vector,
                            &req.query,
                            scope,
                            &req.business_id,
                            VectorField::Standard,
                        )
                        .await
                }
                None => Ok(Vec::new()),
            }
        },
        async {
            match &fine_tuned {
                Some(vector) => {
                    state
                        .backend
                        .search_lexical_plus_vector(
                            vector,
                            &req.query,
                            scope,
                            &req.business_id,
                            VectorField::FineTuned,
                        )
                        .await
                }
                None => Ok(Vec::new()),
            }
        },
    );
    let mut combined = standard_hits?;
    combined.extend(fine_tuned_hits?);

    // ── Step 3: merge, normalize, filter ─────────────────
    let merged = merge_best_by_id(combined);
    let max_score = max_score_or_unit(&merged);
    let kept = filter_by_relative_score(merged, max_score, CLASSIC_SCORE_FLOOR);

    // ── Step 4: enrichment ───────────────────────────────
    let mut results = Vec::new();
    for hit in &kept {
        if let Some(dto) = process_element(
            &state,
            &hit.element,
            hit.score,
            max_score,
            &req.business_id,
            &req.user_id,
        )
        .await
        {
            results.push(dto);
        }
    }

    Ok(Json(results))
}

/// Positive/negative scoring with optional per-article collapse; enriches
/// each group's representative chunk.
async fn collapse_search(
    state: &AppState,
    req: &QueryRequest,
) -> Result<Vec<ElementResponse>, ApiError> {
    let field = req.mode().primary_field();

    let include = state
        .embeddings
        .embed_text(&req.query, field)
        .await?
        .ok_or(ApiError::EmbeddingUnavailable)?;

    let exclude = match req.query_negative.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(negative) => Some(
            state
                .embeddings
                .embed_text(negative, field)
                .await?
                .ok_or(ApiError::EmbeddingUnavailable)?,
        ),
        None => None,
    };

    let groups = state
        .backend
        .search_positive_negative_collapse(
            &include,
            exclude.as_deref(),
            &req.query,
            req.scope.as_deref(),
            &req.business_id,
            req.group_by_external_id.unwrap_or(false),
            GROUP_RESULT_SIZE,
            field,
        )
        .await?;

    let max_score = {
        let max = groups.iter().map(|g| g.parent.score).fold(f64::MIN, f64::max);
        if max > 0.0 {
            max
        } else {
            1.0
        }
    };

    let mut results = Vec::new();
    for group in &groups {
        if let Some(dto) = process_element(
            state,
            &group.parent.element,
            group.parent.score,
            max_score,
            &req.business_id,
            &req.user_id,
        )
        .await
        {
            results.push(dto);
        }
    }
    Ok(results)
}

// ─── Deep search (streamed) ──────────────────────────────

/// POST /query/deepsearch - two-level expansion streamed as one JSON
/// array, flushed item by item.
///
/// Validation, the query embedding, and the level-1 search all run before
/// the response headers are committed, so their failures still surface as
/// 400/500. Everything after (enrichment, summarization, level-2
/// expansion) streams through a channel that dies with the client
/// connection, cancelling outstanding work.
pub async fn deep_search(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    validate(&req)?;

    let embedding = state
        .embeddings
        .embed_text(&req.query, VectorField::Standard)
        .await?
        .ok_or(ApiError::EmbeddingUnavailable)?;

    let level1 = state
        .backend
        .search_lexical_plus_vector(
            &embedding,
            &req.query,
            req.scope.as_deref(),
            &req.business_id,
            VectorField::Standard,
        )
        .await?;

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(16);
    tokio::spawn(run_deep_levels(state, req, level1, tx));

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok((
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Writes one JSON array incrementally. Each send is one flushed chunk;
/// a failed send means the client went away and the producer must stop.
struct ArrayStream {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
    first: Mutex<bool>,
}

impl ArrayStream {
    fn new(tx: mpsc::Sender<Result<Bytes, Infallible>>) -> Self {
        Self {
            tx,
            first: Mutex::new(true),
        }
    }

    async fn open(&self) -> bool {
        self.tx.send(Ok(Bytes::from_static(b"["))).await.is_ok()
    }

    async fn emit(&self, item: &DeepSearchItem) -> bool {
        let json = match serde_json::to_string(item) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("unserializable deep-search item {}: {e}", item.id);
                return true;
            }
        };
        // The lock is held across the send so the comma bookkeeping and
        // the write order cannot diverge under concurrent emitters.
        let mut first = self.first.lock().await;
        let chunk = if *first {
            *first = false;
            json
        } else {
            format!(",{json}")
        };
        self.tx.send(Ok(Bytes::from(chunk))).await.is_ok()
    }

    async fn close(&self) -> bool {
        self.tx.send(Ok(Bytes::from_static(b"]"))).await.is_ok()
    }
}

async fn run_deep_levels(
    state: AppState,
    req: QueryRequest,
    level1: Vec<ScoredElement>,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) {
    let stream = Arc::new(ArrayStream::new(tx));
    if !stream.open().await {
        return;
    }

    let max_score = max_score_or_unit(&level1);
    let mut seen: HashSet<String> = HashSet::new();
    let mut parents: Vec<(ScoredElement, String)> = Vec::new();

    // ── Level 1: enrich, summarize, emit ─────────────────
    for hit in level1 {
        if hit.score < max_score * DEEP_SCORE_FLOOR {
            continue;
        }
        let Some(dto) = process_element(
            &state,
            &hit.element,
            hit.score,
            max_score,
            &req.business_id,
            &req.user_id,
        )
        .await
        else {
            continue;
        };

        let text = match &dto.fulltext_live {
            Some(live) => format!("{}{live}", dto.fulltext),
            None => dto.fulltext.clone(),
        };
        let summary = match state.summarizer.summarize(&text, &req.query).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("summarization failed for {}: {e}", dto.id);
                continue;
            }
        };
        if summary.contains(DELETE_MARKER) {
            continue;
        }

        let item = DeepSearchItem {
            id: dto.id.clone(),
            commands: dto.commands.clone(),
            summary: summary.clone(),
            parent_level: None,
        };
        if !stream.emit(&item).await {
            return;
        }
        seen.insert(dto.id);
        parents.push((hit, summary));
    }

    // ── Level 2: bounded fan-out over the parents ────────
    // Each expansion re-embeds the parent's *summary*, not the original
    // query: the second pass deliberately targets the summary's own
    // semantics to reach results the literal query terms cannot.
    let seen = Arc::new(Mutex::new(seen));
    let semaphore = Arc::new(Semaphore::new(state.config.deep_search_fanout));
    let mut handles = Vec::new();

    for (parent, summary) in parents {
        let state = state.clone();
        let req = req.clone();
        let stream = Arc::clone(&stream);
        let seen = Arc::clone(&seen);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            expand_parent(&state, &req, &parent, &summary, max_score, &stream, &seen).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    let _ = stream.close().await;
}

/// One level-2 expansion. Failures here are local to the parent: the
/// stream keeps going with whatever the other parents produce.
async fn expand_parent(
    state: &AppState,
    req: &QueryRequest,
    parent: &ScoredElement,
    summary: &str,
    max_score: f64,
    stream: &ArrayStream,
    seen: &Mutex<HashSet<String>>,
) {
    let embedding = match state.embeddings.embed_text(summary, VectorField::Standard).await {
        Ok(Some(vector)) => vector,
        Ok(None) => {
            tracing::warn!("level-2 embedding unavailable for parent {}", parent.element.id);
            return;
        }
        Err(e) => {
            tracing::warn!("level-2 embedding failed for parent {}: {e}", parent.element.id);
            return;
        }
    };

    let hits = match state
        .backend
        .search_lexical_plus_vector(
            &embedding,
            &req.query,
            req.scope.as_deref(),
            &req.business_id,
            VectorField::Standard,
        )
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!("level-2 search failed for parent {}: {e}", parent.element.id);
            return;
        }
    };

    for hit in hits {
        // Reserve the id before the slow work so concurrent parents never
        // emit the same element twice.
        {
            let mut seen = seen.lock().await;
            if !seen.insert(hit.element.id.clone()) {
                continue;
            }
        }

        let Some(dto) = process_element(
            state,
            &hit.element,
            0.0,
            max_score,
            &req.business_id,
            &req.user_id,
        )
        .await
        else {
            continue;
        };

        let text = match &dto.fulltext_live {
            Some(live) => format!("{}{live}", dto.fulltext),
            None => dto.fulltext.clone(),
        };
        let summary = match state.summarizer.summarize(&text, &req.query).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("summarization failed for {}: {e}", dto.id);
                continue;
            }
        };
        if summary.contains(DELETE_MARKER) {
            continue;
        }

        let item = DeepSearchItem {
            id: dto.id,
            commands: dto.commands,
            summary,
            parent_level: Some(parent.element.id.clone()),
        };
        if !stream.emit(&item).await {
            return;
        }
    }
}

// ─── Deepsense (PCA-refined) search ──────────────────────

/// POST /query/deepsense - re-ranks by the retrieved set's own dominant
/// direction: an initial hybrid pass collects up to 20 standard vectors,
/// their principal component becomes the query vector of a second,
/// vector-only pass.
pub async fn deepsense(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Vec<ElementResponse>>, ApiError> {
    validate(&req)?;

    let embedding = state
        .embeddings
        .embed_text(&req.query, VectorField::Standard)
        .await?
        .ok_or(ApiError::EmbeddingUnavailable)?;

    let initial = state
        .backend
        .search_lexical_plus_vector(
            &embedding,
            &req.query,
            req.scope.as_deref(),
            &req.business_id,
            VectorField::Standard,
        )
        .await?;

    let sample: Vec<Vec<f64>> = initial
        .iter()
        .filter_map(|hit| hit.element.fulltext_vect.clone())
        .take(DEEPSENSE_SAMPLE_SIZE)
        .collect();

    if sample.len() < 2 {
        return Err(ApiError::InsufficientSamples);
    }

    let component = principal_component(&sample).map_err(|e| match e {
        PcaError::InsufficientSamples { .. } => ApiError::InsufficientSamples,
        PcaError::DimensionMismatch { .. } => ApiError::Internal(e.to_string()),
    })?;

    let refined = state
        .backend
        .search_vector_only(
            &component,
            req.scope.as_deref(),
            &req.business_id,
            VectorField::Standard,
        )
        .await?;

    let max_score = max_score_or_unit(&refined);
    let kept = filter_by_relative_score(refined, max_score, DEEPSENSE_SCORE_FLOOR);

    let mut results = Vec::new();
    for hit in &kept {
        if let Some(dto) = process_element(
            &state,
            &hit.element,
            hit.score,
            max_score,
            &req.business_id,
            &req.user_id,
        )
        .await
        {
            results.push(dto);
        }
    }
    Ok(Json(results))
}

// ─── Aggregated search ───────────────────────────────────

/// POST /query/searchaggregate - two-phase aggregation by external
/// article id. Groups are returned as-is; consumers work on chunk-level
/// summaries, so there is no per-document enrichment here.
pub async fn search_aggregate(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Vec<AggregatedGroup>>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::Validation("Query cannot be empty".to_string()));
    }
    if req.business_id.trim().is_empty() {
        return Err(ApiError::Validation("BusinessId is required".to_string()));
    }

    let field = req.mode().primary_field();

    let include = state
        .embeddings
        .embed_text(&req.query, field)
        .await?
        .ok_or(ApiError::EmbeddingUnavailable)?;

    let exclude = match req.query_negative.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(negative) => Some(
            state
                .embeddings
                .embed_text(negative, field)
                .await?
                .ok_or(ApiError::EmbeddingUnavailable)?,
        ),
        None => None,
    };

    let groups = state
        .backend
        .search_aggregated_by_external_id(
            &include,
            exclude.as_deref(),
            &req.query,
            req.scope.as_deref(),
            &req.business_id,
            GROUP_RESULT_SIZE,
            field,
        )
        .await?;

    Ok(Json(groups))
}

// ─── Image search ────────────────────────────────────────

/// POST /query/searchimage - multipart form: `image` file plus
/// businessId/userId/scope/text fields. Embeds the image and ranks the
/// image collection by similarity.
pub async fn search_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ImageSearchRow>>, ApiError> {
    let mut image: Option<Bytes> = None;
    let mut business_id = String::new();
    let mut user_id = String::new();
    let mut scope: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                image = Some(field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("failed to read image field: {e}"))
                })?);
            }
            Some("businessId") => {
                business_id = field.text().await.unwrap_or_default();
            }
            Some("userId") => {
                user_id = field.text().await.unwrap_or_default();
            }
            Some("scope") => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    scope = Some(value);
                }
            }
            // `text` is accepted for forward compatibility with
            // multimodal queries but does not enter the ranking.
            _ => {}
        }
    }

    let image = match image {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Err(ApiError::Validation("Image file is required.".to_string())),
    };
    if business_id.trim().is_empty() {
        return Err(ApiError::Validation("BusinessId is required".to_string()));
    }
    if user_id.trim().is_empty() {
        return Err(ApiError::Validation("UserId is required".to_string()));
    }

    let embedding = state
        .embeddings
        .embed_image(&image, scope.as_deref())
        .await?
        .ok_or(ApiError::EmbeddingUnavailable)?;

    let hits = state
        .backend
        .search_image_vector(&embedding, scope.as_deref(), &business_id)
        .await?;

    let max_score = {
        let max = hits.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
        if max > 0.0 {
            max
        } else {
            1.0
        }
    };

    let rows = hits
        .into_iter()
        .filter(|(_, score)| *score >= max_score * IMAGE_SCORE_FLOOR)
        .map(|(image, score)| ImageSearchRow {
            id: image.id,
            title: image.title,
            fulltext: image.fulltext,
            image_url: image.image_url,
            element_id: image.element_id,
            score,
            relevance: relevance_percent(score, max_score),
        })
        .collect();

    Ok(Json(rows))
}

// ─── Direct lookup ───────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementLookupParams {
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /query/element/{id} - direct lookup with enrichment at full
/// relevance; 404 on a miss or when the element's live-data validation
/// rejects it for this caller.
pub async fn element_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ElementLookupParams>,
) -> Result<Json<ElementResponse>, ApiError> {
    let business_id = params
        .business_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("BusinessId is required".to_string()))?;
    let user_id = params
        .user_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("UserId is required".to_string()))?;

    let element = state
        .backend
        .get_element_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let dto = process_element(&state, &element, 1.0, 1.0, &business_id, &user_id)
        .await
        .ok_or(ApiError::NotFound)?;

    Ok(Json(dto))
}
