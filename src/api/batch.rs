use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::VectorField;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchParams {
    #[serde(default, rename = "type")]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub success: bool,
    #[serde(rename = "type")]
    pub mode: &'static str,
    pub updated: usize,
    pub failed: usize,
}

/// POST /embeddings/batch?type=standard|fine-tuned - re-embed the whole
/// corpus into the selected vector field.
///
/// Elements with an empty body are skipped; an unavailable embedding is
/// counted as a failure and the walk continues. Selecting the fine-tuned
/// backend while it is unconfigured fails the job immediately.
pub async fn reembed(
    State(state): State<AppState>,
    Query(params): Query<BatchParams>,
) -> Result<Json<BatchReport>, ApiError> {
    let field = match params.mode.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("") | Some("fine-tuned") => VectorField::FineTuned,
        Some("standard") => VectorField::Standard,
        Some(_) => {
            return Err(ApiError::Validation(
                "Invalid type. Must be 'standard' or 'fine-tuned'.".to_string(),
            ))
        }
    };

    let elements = state.backend.get_all_elements().await?;
    let mut updated = 0usize;
    let mut failed = 0usize;

    for mut element in elements {
        if element.fulltext.trim().is_empty() {
            continue;
        }

        let embedding = match state.embeddings.embed_text(&element.fulltext, field).await? {
            Some(vector) => vector,
            None => {
                failed += 1;
                continue;
            }
        };
        field.assign(&mut element, embedding);

        match state.backend.index_element(&element).await {
            Ok(()) => updated += 1,
            Err(e) => {
                tracing::warn!("re-index failed for {}: {e}", element.id);
                failed += 1;
            }
        }
    }

    tracing::info!(
        "batch re-embedding ({}) finished: {updated} updated, {failed} failed",
        field.label()
    );

    Ok(Json(BatchReport {
        success: true,
        mode: field.label(),
        updated,
        failed,
    }))
}
