//! Adapter to the Elasticsearch-compatible search index.
//!
//! Builds the query DSL for the lexical, vector, hybrid, and aggregation
//! queries over the `elements` collection (and `images` for image
//! search), and parses the hit envelopes back into typed results. All
//! scoring expressions used server-side mirror the client-side
//! [`cosine`](crate::search::cosine::cosine) scorer.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::{
    AggregatedChunk, AggregatedGroup, Element, SearchImage, VectorField,
};
use crate::search::cosine::cosine;
use crate::search::merge::ScoredElement;

pub const ELEMENTS_INDEX: &str = "elements";
pub const IMAGES_INDEX: &str = "images";

/// Weight of the exclude-similarity in positive/negative scoring.
pub const NEGATIVE_WEIGHT: f64 = 0.8;
/// Backend-side floor for positive/negative and phase-1 aggregation hits.
pub const GROUP_SCORE_FLOOR: f64 = 1.05;
/// A group is dropped when any of its chunks is at least this similar to
/// the negative query.
pub const NEGATIVE_SIMILARITY_CEILING: f64 = 0.05;
/// Collapse mode returns at most this many member chunks per external id.
const COLLAPSE_INNER_HITS: usize = 10;
/// Phase-1 hit window feeding the external-id shortlist.
const PHASE_ONE_WINDOW: usize = 500;
/// Phase-2 re-fetch bound: all chunks of the shortlisted articles.
const PHASE_TWO_WINDOW: usize = 1000;

/// One collapse-mode group: the best-scoring chunk of an external article
/// plus up to [`COLLAPSE_INNER_HITS`] sibling chunks.
#[derive(Debug, Clone)]
pub struct CollapsedGroup {
    pub parent: ScoredElement,
    pub chunks: Vec<ScoredElement>,
}

pub struct SearchBackend {
    client: reqwest::Client,
    base_url: String,
}

impl SearchBackend {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Hybrid lexical + vector ranking: lexical relevance (title boosted
    /// 2.0, body 1.2) multiplied by `cosine + 1.0` against the selected
    /// vector field.
    pub async fn search_lexical_plus_vector(
        &self,
        vector: &[f64],
        query: &str,
        scope: Option<&str>,
        business_id: &str,
        field: VectorField,
    ) -> Result<Vec<ScoredElement>, ApiError> {
        let body = json!({
            "size": 100,
            "query": {
                "function_score": {
                    "query": {
                        "bool": {
                            "must": [{ "match_all": {} }],
                            "should": lexical_should_clauses(query),
                            "minimum_should_match": 1,
                            "filter": visibility_filter(scope, business_id)
                        }
                    },
                    "functions": [{
                        "script_score": { "script": cosine_script(field, vector) }
                    }],
                    "boost_mode": "multiply"
                }
            }
        });

        let resp: EsSearchResponse<Element> = self.search(ELEMENTS_INDEX, &body).await?;
        Ok(scored_elements(resp))
    }

    /// Pure vector ranking over the whole visible corpus; used by the
    /// PCA-refined second pass.
    pub async fn search_vector_only(
        &self,
        vector: &[f64],
        scope: Option<&str>,
        business_id: &str,
        field: VectorField,
    ) -> Result<Vec<ScoredElement>, ApiError> {
        let body = json!({
            "size": 1000,
            "query": {
                "script_score": {
                    "query": {
                        "bool": { "filter": visibility_filter(scope, business_id) }
                    },
                    "script": cosine_script(field, vector)
                }
            }
        });

        let resp: EsSearchResponse<Element> = self.search(ELEMENTS_INDEX, &body).await?;
        Ok(scored_elements(resp))
    }

    /// Vector ranking over the image collection. Images are business-owned,
    /// so the filter is a plain term match without the visible-to-all
    /// sentinels.
    pub async fn search_image_vector(
        &self,
        vector: &[f64],
        scope: Option<&str>,
        business_id: &str,
    ) -> Result<Vec<(SearchImage, f64)>, ApiError> {
        let mut filter = Vec::new();
        if let Some(scope) = scope {
            filter.push(json!({ "term": { "scope": scope } }));
        }
        if !business_id.is_empty() {
            filter.push(json!({ "term": { "businessId": business_id } }));
        }

        let body = json!({
            "size": 10,
            "query": {
                "script_score": {
                    "query": { "bool": { "filter": filter } },
                    "script": {
                        "source": "cosineSimilarity(params.query_vector, 'imageVect') + 1.0",
                        "params": { "query_vector": vector }
                    }
                }
            }
        });

        let resp: EsSearchResponse<SearchImage> = self.search(IMAGES_INDEX, &body).await?;
        Ok(resp
            .hits
            .hits
            .into_iter()
            .map(|h| (h.source, h.score.unwrap_or(0.0)))
            .collect())
    }

    /// Positive/negative scoring with optional per-article collapse.
    ///
    /// Score: `max(0, cos(include) − 0.8·cos(exclude) + 1.0)` when an
    /// exclude vector is present, else `cos(include) + 1.0`; the backend
    /// drops hits below [`GROUP_SCORE_FLOOR`]. The query text acts as a
    /// lexical recall gate in filter context so it never distorts the
    /// score formula.
    pub async fn search_positive_negative_collapse(
        &self,
        include: &[f64],
        exclude: Option<&[f64]>,
        query: &str,
        scope: Option<&str>,
        business_id: &str,
        collapse_by_external_id: bool,
        size: usize,
        field: VectorField,
    ) -> Result<Vec<CollapsedGroup>, ApiError> {
        let mut filter = visibility_filter(scope, business_id);
        filter.push(json!({
            "bool": {
                "should": lexical_should_clauses(query),
                "minimum_should_match": 1
            }
        }));

        let mut body = json!({
            "size": size,
            "min_score": GROUP_SCORE_FLOOR,
            "query": {
                "script_score": {
                    "query": { "bool": { "filter": filter } },
                    "script": positive_negative_script(field, include, exclude)
                }
            }
        });

        if collapse_by_external_id {
            body["collapse"] = json!({
                "field": "externalArticleId",
                "inner_hits": {
                    "name": "chunks",
                    "size": COLLAPSE_INNER_HITS,
                    "sort": [{ "_score": "desc" }]
                }
            });
        }

        let resp: EsSearchResponse<Element> = self.search(ELEMENTS_INDEX, &body).await?;
        Ok(resp
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let chunks = hit
                    .inner_hits
                    .and_then(|ih| ih.chunks)
                    .map(|env| {
                        env.hits
                            .hits
                            .into_iter()
                            .map(|h| ScoredElement {
                                element: h.source,
                                score: h.score.unwrap_or(0.0),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                CollapsedGroup {
                    parent: ScoredElement {
                        element: hit.source,
                        score: hit.score.unwrap_or(0.0),
                    },
                    chunks,
                }
            })
            .collect())
    }

    /// Two-phase aggregation by external article id.
    ///
    /// Phase 1 shortlists article ids with a hybrid function-score query
    /// under a hard score floor; phase 2 re-fetches **all** chunks of the
    /// shortlisted articles, unbounded by the floor, and re-scores them
    /// with exact client-side cosine similarity. The re-fetch exists
    /// because the shortlist floor would otherwise bias which chunks end
    /// up in a group's final chunk set.
    pub async fn search_aggregated_by_external_id(
        &self,
        include: &[f64],
        exclude: Option<&[f64]>,
        query: &str,
        scope: Option<&str>,
        business_id: &str,
        size: usize,
        field: VectorField,
    ) -> Result<Vec<AggregatedGroup>, ApiError> {
        // ── Phase 1: shortlist article ids ───────────────────
        let body = json!({
            "size": PHASE_ONE_WINDOW,
            "min_score": GROUP_SCORE_FLOOR,
            "query": {
                "function_score": {
                    "query": {
                        "bool": {
                            "must": [{ "match_all": {} }],
                            "should": lexical_should_clauses(query),
                            "minimum_should_match": 1,
                            "filter": visibility_filter(scope, business_id)
                        }
                    },
                    "functions": [{
                        "script_score": { "script": cosine_script(field, include) }
                    }],
                    "boost_mode": "sum"
                }
            }
        });

        let resp: EsSearchResponse<Element> = self.search(ELEMENTS_INDEX, &body).await?;
        let shortlist = shortlist_external_ids(&scored_elements(resp), size);
        if shortlist.is_empty() {
            return Ok(Vec::new());
        }

        // ── Phase 2: full chunk sets, exact re-scoring ───────
        let mut filter = visibility_filter(scope, business_id);
        filter.push(json!({ "terms": { "externalArticleId": shortlist } }));

        let body = json!({
            "size": PHASE_TWO_WINDOW,
            "query": { "bool": { "filter": filter } }
        });

        let resp: EsSearchResponse<Element> = self.search(ELEMENTS_INDEX, &body).await?;
        let chunks: Vec<Element> = resp.hits.hits.into_iter().map(|h| h.source).collect();

        build_aggregated_groups(chunks, include, exclude, field)
    }

    /// Direct lookup by document id.
    pub async fn get_element_by_id(&self, id: &str) -> Result<Option<Element>, ApiError> {
        let url = format!("{}/{ELEMENTS_INDEX}/_doc/{id}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Backend(format!("get {id}: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ApiError::Backend(format!(
                "get {id}: index returned {}",
                resp.status()
            )));
        }

        let body: EsGetResponse<Element> = resp
            .json()
            .await
            .map_err(|e| ApiError::Backend(format!("get {id}: {e}")))?;
        Ok(if body.found { body.source } else { None })
    }

    /// Full corpus walk for the batch re-embedding job.
    pub async fn get_all_elements(&self) -> Result<Vec<Element>, ApiError> {
        let body = json!({ "query": { "match_all": {} }, "size": 10000 });
        let resp: EsSearchResponse<Element> = self.search(ELEMENTS_INDEX, &body).await?;
        Ok(resp.hits.hits.into_iter().map(|h| h.source).collect())
    }

    /// Upsert an element document (used after re-embedding).
    pub async fn index_element(&self, element: &Element) -> Result<(), ApiError> {
        let url = format!("{}/{ELEMENTS_INDEX}/_doc/{}", self.base_url, element.id);
        let resp = self
            .client
            .put(&url)
            .json(element)
            .send()
            .await
            .map_err(|e| ApiError::Backend(format!("index {}: {e}", element.id)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Backend(format!(
                "index {}: index returned {status}: {body}",
                element.id
            )));
        }
        Ok(())
    }

    async fn search<T: DeserializeOwned>(
        &self,
        index: &str,
        body: &Value,
    ) -> Result<EsSearchResponse<T>, ApiError> {
        let url = format!("{}/{index}/_search", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Backend(format!("search index unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Backend(format!(
                "query rejected with {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| ApiError::Backend(format!("malformed search response: {e}")))
    }
}

// ─── Query construction ──────────────────────────────────

/// Mandatory business-visibility filter plus the optional scope term.
/// Elements visible to all carry either no businessId or the literal "0";
/// both sentinels are genuine and must stay.
fn visibility_filter(scope: Option<&str>, business_id: &str) -> Vec<Value> {
    let mut filter = Vec::new();
    if let Some(scope) = scope {
        filter.push(json!({ "term": { "scope": scope } }));
    }
    filter.push(json!({
        "bool": {
            "should": [
                { "term": { "businessId": business_id } },
                { "bool": { "must_not": { "exists": { "field": "businessId" } } } },
                { "term": { "businessId": "0" } }
            ],
            "minimum_should_match": 1
        }
    }));
    filter
}

fn lexical_should_clauses(query: &str) -> Value {
    json!([
        { "match": { "title": { "query": query, "boost": 2.0 } } },
        { "match": { "fulltext": { "query": query, "boost": 1.2 } } }
    ])
}

fn cosine_script(field: VectorField, vector: &[f64]) -> Value {
    json!({
        "source": format!(
            "cosineSimilarity(params.query_vector, '{}') + 1.0",
            field.index_field()
        ),
        "params": { "query_vector": vector }
    })
}

fn positive_negative_script(
    field: VectorField,
    include: &[f64],
    exclude: Option<&[f64]>,
) -> Value {
    match exclude {
        Some(exclude) => json!({
            "source": format!(
                "double pos = cosineSimilarity(params.include_vector, '{field}'); \
                 double neg = cosineSimilarity(params.exclude_vector, '{field}'); \
                 return Math.max(0.0, pos - params.negative_weight * neg + 1.0);",
                field = field.index_field()
            ),
            "params": {
                "include_vector": include,
                "exclude_vector": exclude,
                "negative_weight": NEGATIVE_WEIGHT
            }
        }),
        None => json!({
            "source": format!(
                "cosineSimilarity(params.include_vector, '{}') + 1.0",
                field.index_field()
            ),
            "params": { "include_vector": include }
        }),
    }
}

// ─── Aggregation post-processing ─────────────────────────

/// Top `size` external ids from a floor-filtered hit list, ordered by each
/// group's maximum chunk score. Hits without an external id cannot group
/// and are skipped.
fn shortlist_external_ids(hits: &[ScoredElement], size: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut best: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for hit in hits {
        let Some(ext_id) = hit.element.external_article_id.as_deref() else {
            continue;
        };
        match best.get_mut(ext_id) {
            Some(score) => *score = score.max(hit.score),
            None => {
                best.insert(ext_id.to_string(), hit.score);
                order.push(ext_id.to_string());
            }
        }
    }
    order.sort_by(|a, b| {
        best[b].partial_cmp(&best[a]).unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(size);
    order
}

/// Exact client-side re-scoring and the negative-exclusion gate.
fn build_aggregated_groups(
    chunks: Vec<Element>,
    include: &[f64],
    exclude: Option<&[f64]>,
    field: VectorField,
) -> Result<Vec<AggregatedGroup>, ApiError> {
    struct ScoredChunk {
        element: Element,
        positive: f64,
        negative: Option<f64>,
    }

    let mut grouped: std::collections::HashMap<String, Vec<ScoredChunk>> =
        std::collections::HashMap::new();

    for element in chunks {
        let Some(ext_id) = element.external_article_id.clone() else {
            continue;
        };
        let (positive, negative) = match field.vector_of(&element) {
            Some(vector) => {
                let positive = cosine(include, vector)
                    .map_err(|e| ApiError::Internal(e.to_string()))?;
                let negative = match exclude {
                    Some(exclude) => Some(
                        cosine(exclude, vector)
                            .map_err(|e| ApiError::Internal(e.to_string()))?,
                    ),
                    None => None,
                };
                (positive, negative)
            }
            None => {
                tracing::debug!("chunk {} has no {} vector", element.id, field.label());
                (0.0, None)
            }
        };
        grouped.entry(ext_id).or_default().push(ScoredChunk {
            element,
            positive,
            negative,
        });
    }

    let mut groups: Vec<AggregatedGroup> = Vec::new();
    'group: for (external_id, mut chunks) in grouped {
        for chunk in &chunks {
            if chunk.negative.is_some_and(|n| n >= NEGATIVE_SIMILARITY_CEILING) {
                tracing::debug!(
                    "dropping group {external_id}: chunk {} matches the negative query",
                    chunk.element.id
                );
                continue 'group;
            }
        }

        chunks.sort_by(|a, b| {
            b.positive.partial_cmp(&a.positive).unwrap_or(std::cmp::Ordering::Equal)
        });

        let avg_score =
            chunks.iter().map(|c| c.positive).sum::<f64>() / chunks.len() as f64;
        let max_positive_score = chunks
            .iter()
            .map(|c| c.positive)
            .fold(f64::MIN, f64::max);
        let max_negative_score = chunks
            .iter()
            .filter_map(|c| c.negative)
            .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.max(n))));

        groups.push(AggregatedGroup {
            external_id,
            avg_score,
            max_positive_score: Some(max_positive_score),
            max_negative_score,
            chunks: chunks
                .into_iter()
                .map(|c| AggregatedChunk {
                    id: c.element.id,
                    title: c.element.title,
                    chunk_section: c.element.chunk_section,
                    fulltext: c.element.fulltext,
                    score: c.positive,
                })
                .collect(),
        });
    }

    groups.sort_by(|a, b| {
        b.max_positive_score
            .partial_cmp(&a.max_positive_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(groups)
}

fn scored_elements(resp: EsSearchResponse<Element>) -> Vec<ScoredElement> {
    resp.hits
        .hits
        .into_iter()
        .map(|h| ScoredElement {
            element: h.source,
            score: h.score.unwrap_or(0.0),
        })
        .collect()
}

// ─── Wire envelopes ──────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct EsSearchResponse<T> {
    hits: EsHitsEnvelope<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct EsHitsEnvelope<T> {
    #[serde(default = "Vec::new")]
    hits: Vec<EsHit<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct EsHit<T> {
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: T,
    #[serde(default)]
    inner_hits: Option<EsInnerHits<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct EsInnerHits<T> {
    #[serde(default)]
    chunks: Option<EsInnerEnvelope<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct EsInnerEnvelope<T> {
    hits: EsHitsEnvelope<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct EsGetResponse<T> {
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<T>,
}
