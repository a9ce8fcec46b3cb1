use std::collections::HashMap;

use crate::models::Element;

/// A document plus its raw backend score, request-local.
#[derive(Debug, Clone)]
pub struct ScoredElement {
    pub element: Element,
    pub score: f64,
}

/// Classic mode keeps only hits within this fraction of the batch max.
pub const CLASSIC_SCORE_FLOOR: f64 = 0.65;

/// Union results from several backend passes, keeping one entry per
/// element id, the highest-scoring one.
pub fn merge_best_by_id(hits: Vec<ScoredElement>) -> Vec<ScoredElement> {
    let mut best: HashMap<String, ScoredElement> = HashMap::new();
    for hit in hits {
        match best.get(&hit.element.id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.element.id.clone(), hit);
            }
        }
    }
    let mut merged: Vec<ScoredElement> = best.into_values().collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

/// Highest score in the set, or `1.0` for an empty/non-positive set so
/// downstream ratios stay defined.
pub fn max_score_or_unit(hits: &[ScoredElement]) -> f64 {
    let max = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Drop every hit scoring below `floor_ratio × max`.
pub fn filter_by_relative_score(
    hits: Vec<ScoredElement>,
    max_score: f64,
    floor_ratio: f64,
) -> Vec<ScoredElement> {
    hits.into_iter()
        .filter(|h| h.score >= max_score * floor_ratio)
        .collect()
}

/// Relevance as an integer percentage of the batch maximum, clamped to
/// `0..=100`. A non-positive maximum defines relevance as 0.
pub fn relevance_percent(score: f64, max_score: f64) -> u8 {
    if max_score <= 0.0 {
        return 0;
    }
    let percent = (score / max_score * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}
