/// Cosine similarity between equal-length vectors.
///
/// Used client-side for exact re-scoring of aggregated chunks; the search
/// index computes the same quantity server-side in its scoring scripts,
/// so the two must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CosineError {
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Returns a value in `[-1, 1]`; `0.0` when either vector has zero norm.
/// Mismatched lengths are a schema-level fault and never silently
/// truncated.
pub fn cosine(a: &[f64], b: &[f64]) -> Result<f64, CosineError> {
    if a.len() != b.len() {
        return Err(CosineError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / denom)
    }
}
