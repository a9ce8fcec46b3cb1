//! Integration tests for the retrieval pipeline.
//!
//! These exercise the merge/filter/relevance flow, PCA-refined ranking,
//! and live-data validation/templating end-to-end on synthetic data,
//! without requiring a search index or embedding backend.

use element_search::enrich::expr::Expr;
use element_search::enrich::template::Template;
use element_search::models::{Element, EMBEDDING_DIM};
use element_search::search::cosine::cosine;
use element_search::search::merge::{
    filter_by_relative_score, max_score_or_unit, merge_best_by_id, relevance_percent,
    ScoredElement, CLASSIC_SCORE_FLOOR,
};
use element_search::search::pca::principal_component;

fn element(id: &str) -> Element {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "scope": "support",
        "title": format!("title {id}"),
        "fulltext": format!("body {id}"),
    }))
    .unwrap()
}

fn hit(id: &str, score: f64) -> ScoredElement {
    ScoredElement {
        element: element(id),
        score,
    }
}

// ─── Classic merge + filter + relevance ──────────────────

#[test]
fn test_classic_flow_dedupes_filters_and_ranks() {
    // Standard and fine-tuned passes overlap on "faq-1" and "faq-2"
    let standard_pass = vec![hit("faq-1", 2.0), hit("faq-2", 1.8), hit("faq-3", 1.0)];
    let fine_tuned_pass = vec![hit("faq-2", 2.1), hit("faq-1", 1.2), hit("faq-4", 1.5)];

    let mut combined = standard_pass;
    combined.extend(fine_tuned_pass);
    let merged = merge_best_by_id(combined);

    // One entry per id, best score kept
    let ids: Vec<&str> = merged.iter().map(|h| h.element.id.as_str()).collect();
    assert_eq!(ids.len(), 4);
    let faq2 = merged.iter().find(|h| h.element.id == "faq-2").unwrap();
    assert_eq!(faq2.score, 2.1);

    let max = max_score_or_unit(&merged);
    assert_eq!(max, 2.1);

    let kept = filter_by_relative_score(merged, max, CLASSIC_SCORE_FLOOR);
    // Floor is 1.365: faq-3 (1.0) is dropped, faq-4 (1.5) survives
    let kept_ids: Vec<&str> = kept.iter().map(|h| h.element.id.as_str()).collect();
    assert_eq!(kept_ids, vec!["faq-2", "faq-1", "faq-4"]);

    // Relevance is a descending 0..=100 integer sequence over the batch
    let relevances: Vec<u8> = kept.iter().map(|h| relevance_percent(h.score, max)).collect();
    assert_eq!(relevances[0], 100);
    for pair in relevances.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
    for r in relevances {
        assert!(r <= 100);
    }
}

#[test]
fn test_empty_result_set_relevance_is_zero() {
    let hits: Vec<ScoredElement> = Vec::new();
    let max = max_score_or_unit(&hits);
    assert_eq!(max, 1.0);
    // With non-positive raw maxima, every relevance is defined as 0
    assert_eq!(relevance_percent(-0.4, 0.0), 0);
    assert_eq!(relevance_percent(0.0, -1.0), 0);
}

// ─── Deepsense: PCA-refined re-ranking ───────────────────

fn direction(hot: usize) -> Vec<f64> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[hot] = 1.0;
    v
}

fn noisy_sample(hot: usize, count: usize) -> Vec<Vec<f64>> {
    (0..count)
        .map(|i| {
            let mut v = vec![0.0; EMBEDDING_DIM];
            v[hot] = (i as f64 + 1.0) * 2.0;
            v[(hot + i + 1) % EMBEDDING_DIM] = 0.02;
            v
        })
        .collect()
}

#[test]
fn test_pca_refined_ranking_discriminates_the_dominant_direction() {
    // The initial result sample clusters along axis 7
    let sample = noisy_sample(7, 12);
    let component = principal_component(&sample).unwrap();

    // Sign-invariant assertions: the component may point either way along
    // the cluster axis, so compare absolute cosines, never raw scores.
    let on_topic = cosine(&component, &direction(7)).unwrap();
    assert!(on_topic.abs() > 0.999, "|cos| was {}", on_topic.abs());

    let off_a = cosine(&component, &direction(100)).unwrap();
    let off_b = cosine(&component, &direction(500)).unwrap();
    assert!(off_a.abs() < 0.05);
    assert!(off_b.abs() < 0.05);

    // Whatever the sign, the refined pass separates on-topic from
    // off-topic by a wide margin.
    assert!(on_topic.abs() - off_a.abs() > 0.9);
}

#[test]
fn test_pca_insufficient_samples_matches_deepsense_gate() {
    // Fewer than 2 vectors must be rejected, mirroring the endpoint's
    // 400 "Insufficient embedding vectors for PCA".
    let one = noisy_sample(3, 1);
    assert!(principal_component(&one).is_err());
    let two = noisy_sample(3, 2);
    assert!(principal_component(&two).is_ok());
}

// ─── Negative-query exclusion, client-side scoring ───────

#[test]
fn test_negative_similarity_gate_on_chunks() {
    // A chunk whose cosine-to-negative is high must take its whole group
    // out of the results; the orchestrator uses a 0.05 ceiling.
    let include = direction(0);
    let exclude = direction(1);

    let mut near_negative = vec![0.0; EMBEDDING_DIM];
    near_negative[0] = 0.5;
    near_negative[1] = 0.9; // strongly aligned with the negative query

    let neg_sim = cosine(&exclude, &near_negative).unwrap();
    assert!(neg_sim >= 0.05);

    let clean = direction(0);
    assert!(cosine(&exclude, &clean).unwrap() < 0.05);
    assert!(cosine(&include, &clean).unwrap() > 0.999);
}

// ─── Live-data validation + templating ───────────────────

#[test]
fn test_validation_then_render_flow() {
    let live_data = serde_json::json!({
        "status": "available",
        "stock": 4,
        "price": {"amount": 129.0, "currency": "EUR"},
    });

    // Stored validation rule accepts the candidate…
    let rule = Expr::parse("model.status == 'available' && model.stock > 0").unwrap();
    assert!(rule.eval_bool(&live_data).unwrap());

    // …and the stored template renders the live fragment.
    let template =
        Template::parse("In stock: {{ model.stock }} / {{ model.price.amount }} {{ model.price.currency }}")
            .unwrap();
    assert_eq!(
        template.render(&live_data).unwrap(),
        "In stock: 4 / 129 EUR"
    );
}

#[test]
fn test_validation_rejects_out_of_stock() {
    let live_data = serde_json::json!({"status": "available", "stock": 0});
    let rule = Expr::parse("model.status == 'available' && model.stock > 0").unwrap();
    assert!(!rule.eval_bool(&live_data).unwrap());
}

#[test]
fn test_template_failure_does_not_poison_validation() {
    // A template referencing a missing field fails to render, but the
    // validation verdict on the same payload is independent of it.
    let live_data = serde_json::json!({"ok": true});
    let rule = Expr::parse("model.ok").unwrap();
    assert!(rule.eval_bool(&live_data).unwrap());

    let template = Template::parse("{{ model.details.label }}").unwrap();
    assert!(template.render(&live_data).is_err());
}

// ─── Wire-shape checks ───────────────────────────────────

#[test]
fn test_element_round_trips_through_index_json() {
    let raw = serde_json::json!({
        "id": "kb-9",
        "scope": "support",
        "businessId": "acme",
        "externalArticleId": "art-12",
        "chunkSection": "Returns",
        "title": "Refund policy",
        "fulltext": "Refunds are processed within 14 days.",
        "commands": [{"commandName": "open", "commandUrl": "https://example.test/kb-9"}],
        "liveDataUrl": "https://live.example.test/kb-9",
        "liveDataValidation": "model.active == true",
        "liveDataTemplate": "Active: {{ model.active }}",
        "fulltextVect": [0.25, 0.75],
    });

    let element: Element = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(element.external_article_id.as_deref(), Some("art-12"));
    assert_eq!(element.commands.len(), 1);

    let back = serde_json::to_value(&element).unwrap();
    assert_eq!(back["businessId"], raw["businessId"]);
    assert_eq!(back["fulltextVect"], raw["fulltextVect"]);
    assert_eq!(back["liveDataTemplate"], raw["liveDataTemplate"]);
    // Absent optional fields stay absent rather than serializing as null
    assert!(back.get("fulltextVectFT").is_none());
}
