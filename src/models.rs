use serde::{Deserialize, Serialize};

/// Fixed dimensionality of every embedding vector in the corpus.
pub const EMBEDDING_DIM: usize = 1024;

/// An indexed knowledge element (one chunk of an article, or a standalone
/// document). Vectors are present after indexing; `fulltext_vect_ft` only
/// for scopes configured with a fine-tuned embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_article_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_section: Option<String>,
    pub title: String,
    pub fulltext: String,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_data_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_data_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_data_validation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext_vect: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltext_vect_ft: Option<Vec<f64>>,
}

/// A named action a client can run against an element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(default)]
    pub command_name: Option<String>,
    #[serde(default)]
    pub command_url: Option<String>,
}

/// An indexed image, searchable by image-embedding similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchImage {
    pub id: String,
    pub scope: String,
    pub business_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fulltext: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_vect: Option<Vec<f64>>,
}

/// Which embedding backend(s) a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EmbeddingMode {
    #[default]
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "fine-tuned")]
    FineTuned,
    #[serde(rename = "mixed")]
    Mixed,
}

/// Selects one of the two dense-vector fields of an element.
///
/// Replaces by-name reflection over index field strings: every site that
/// reads, writes, or scores against a vector field goes through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorField {
    Standard,
    FineTuned,
}

impl VectorField {
    /// Name of the dense-vector field in the search index.
    pub fn index_field(self) -> &'static str {
        match self {
            VectorField::Standard => "fulltextVect",
            VectorField::FineTuned => "fulltextVectFT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VectorField::Standard => "standard",
            VectorField::FineTuned => "fine-tuned",
        }
    }

    pub fn vector_of(self, element: &Element) -> Option<&[f64]> {
        match self {
            VectorField::Standard => element.fulltext_vect.as_deref(),
            VectorField::FineTuned => element.fulltext_vect_ft.as_deref(),
        }
    }

    pub fn assign(self, element: &mut Element, vector: Vec<f64>) {
        match self {
            VectorField::Standard => element.fulltext_vect = Some(vector),
            VectorField::FineTuned => element.fulltext_vect_ft = Some(vector),
        }
    }
}

impl EmbeddingMode {
    /// The vector field a single-field query should score against.
    /// Mixed-mode callers that need both fields branch explicitly instead.
    pub fn primary_field(self) -> VectorField {
        match self {
            EmbeddingMode::Standard | EmbeddingMode::Mixed => VectorField::Standard,
            EmbeddingMode::FineTuned => VectorField::FineTuned,
        }
    }

    pub fn wants_standard(self) -> bool {
        matches!(self, EmbeddingMode::Standard | EmbeddingMode::Mixed)
    }

    pub fn wants_fine_tuned(self) -> bool {
        matches!(self, EmbeddingMode::FineTuned | EmbeddingMode::Mixed)
    }
}

/// Search request body shared by the classic, deep, deepsense, and
/// aggregate endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub business_id: String,
    pub user_id: String,
    #[serde(default, rename = "type")]
    pub mode: Option<EmbeddingMode>,
    #[serde(default)]
    pub query_negative: Option<String>,
    #[serde(default)]
    pub group_by_external_id: Option<bool>,
}

impl QueryRequest {
    pub fn mode(&self) -> EmbeddingMode {
        self.mode.unwrap_or_default()
    }

    /// True when the request asks for positive/negative scoring or
    /// per-article grouping instead of the classic pipeline.
    pub fn is_collapse_mode(&self) -> bool {
        self.query_negative.as_deref().is_some_and(|q| !q.trim().is_empty())
            || self.group_by_external_id.unwrap_or(false)
    }
}

/// One enriched candidate in a batch search response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementResponse {
    pub id: String,
    pub scope: String,
    pub business_id: Option<String>,
    pub title: String,
    pub commands: Vec<Command>,
    pub fulltext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulltext_live: Option<String>,
    pub relevance_score: u8,
}

/// One record of the incrementally streamed deep-search array.
/// `parent_level` is null for level-1 results and carries the parent
/// element id for level-2 expansions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepSearchItem {
    pub id: String,
    pub commands: Vec<Command>,
    pub summary: String,
    pub parent_level: Option<String>,
}

/// A group of chunks sharing an external article id, with client-side
/// exact similarity scores.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedGroup {
    pub external_id: String,
    pub avg_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_positive_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_negative_score: Option<f64>,
    pub chunks: Vec<AggregatedChunk>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedChunk {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_section: Option<String>,
    pub fulltext: String,
    pub score: f64,
}

/// One row of the image-search response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSearchRow {
    pub id: String,
    pub title: Option<String>,
    pub fulltext: Option<String>,
    pub image_url: Option<String>,
    pub element_id: Option<String>,
    pub score: f64,
    pub relevance: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_type_field_deserializes_modes() {
        let req: QueryRequest = serde_json::from_str(
            r#"{"query":"q","businessId":"b","userId":"u","type":"fine-tuned"}"#,
        )
        .unwrap();
        assert_eq!(req.mode(), EmbeddingMode::FineTuned);

        let req: QueryRequest =
            serde_json::from_str(r#"{"query":"q","businessId":"b","userId":"u"}"#).unwrap();
        assert_eq!(req.mode(), EmbeddingMode::Standard);
    }

    #[test]
    fn test_collapse_mode_detection() {
        let mut req: QueryRequest =
            serde_json::from_str(r#"{"query":"q","businessId":"b","userId":"u"}"#).unwrap();
        assert!(!req.is_collapse_mode());

        req.query_negative = Some("unwanted".to_string());
        assert!(req.is_collapse_mode());

        req.query_negative = Some("   ".to_string());
        assert!(!req.is_collapse_mode());

        req.group_by_external_id = Some(true);
        assert!(req.is_collapse_mode());
    }

    #[test]
    fn test_vector_field_assign_and_read_back() {
        let mut element: Element = serde_json::from_str(
            r#"{"id":"e1","scope":"s","title":"t","fulltext":"body"}"#,
        )
        .unwrap();
        assert!(element.fulltext_vect.is_none());

        VectorField::Standard.assign(&mut element, vec![1.0, 2.0]);
        VectorField::FineTuned.assign(&mut element, vec![3.0]);

        assert_eq!(VectorField::Standard.vector_of(&element), Some(&[1.0, 2.0][..]));
        assert_eq!(VectorField::FineTuned.vector_of(&element), Some(&[3.0][..]));
    }

    #[test]
    fn test_element_serializes_camel_case_and_skips_absent_vectors() {
        let element: Element = serde_json::from_str(
            r#"{"id":"e1","scope":"s","title":"t","fulltext":"body","businessId":"b1"}"#,
        )
        .unwrap();
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["businessId"], "b1");
        assert!(json.get("fulltextVect").is_none());
        assert!(json.get("liveDataUrl").is_none());
    }

    #[test]
    fn test_deep_search_item_always_carries_parent_level() {
        let item = DeepSearchItem {
            id: "a".into(),
            commands: Vec::new(),
            summary: "s".into(),
            parent_level: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json["parentLevel"].is_null());
    }

    #[test]
    fn test_mode_field_selection() {
        assert_eq!(EmbeddingMode::Standard.primary_field(), VectorField::Standard);
        assert_eq!(EmbeddingMode::Mixed.primary_field(), VectorField::Standard);
        assert_eq!(EmbeddingMode::FineTuned.primary_field(), VectorField::FineTuned);
        assert!(EmbeddingMode::Mixed.wants_standard());
        assert!(EmbeddingMode::Mixed.wants_fine_tuned());
        assert!(!EmbeddingMode::Standard.wants_fine_tuned());
    }
}
