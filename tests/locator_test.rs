mod common;

use std::sync::Arc;

use common::*;
use normref::errors::NormRefError;
use normref::locator::ReferenceLocator;
use normref::semantic::SemanticTask;
use normref::types::*;
use serde_json::json;

#[tokio::test]
async fn test_hits_are_tagged_by_fragment() {
    let pair = TextFragmentPair::new(
        "les activités mentionnées aux 1° ou 2° du II",
        "les produits mentionnés à l'article L. 253-5 du code rural et de la pêche maritime",
    );
    let output = ReferenceLocator::new(0.6).locate(&pair).await;

    assert!(!output.references.is_empty());
    for r in &output.references {
        let fragment = pair.fragment(r.source_tag);
        assert_eq!(&fragment[r.start_offset..r.end_offset], r.reference_text);
    }
    let deletional: Vec<&str> = output
        .references
        .iter()
        .filter(|r| r.source_tag == SourceTag::Deletional)
        .map(|r| r.reference_text.as_str())
        .collect();
    assert_eq!(deletional, vec!["aux 1° ou 2° du II"]);
}

#[tokio::test]
async fn test_empty_fragments_yield_nothing() {
    let output = ReferenceLocator::new(0.6)
        .locate(&TextFragmentPair::new("", "   "))
        .await;
    assert!(output.references.is_empty());
    assert!(output.low_confidence.is_empty());
}

#[tokio::test]
async fn test_low_confidence_hits_are_kept_separately() {
    let pair = TextFragmentPair::new("mentionnées aux 1° ou 2° du II ou au IV.", "");
    let output = ReferenceLocator::new(0.6).locate(&pair).await;

    assert_eq!(output.references.len(), 1);
    assert_eq!(output.low_confidence.len(), 1);
    assert_eq!(output.low_confidence[0].reference_text, "au IV");

    let strict = ReferenceLocator::new(0.95).locate(&pair).await;
    assert!(strict.references.is_empty());
    assert_eq!(strict.low_confidence.len(), 2);
}

#[tokio::test]
async fn test_nested_hit_points_to_enclosing_reference() {
    let pair = TextFragmentPair::new(
        "",
        "au sens de l'article 47 du même règlement (CE) n° 1107/2009",
    );
    let output = ReferenceLocator::new(0.6).locate(&pair).await;

    assert_eq!(output.references.len(), 2);
    let outer = &output.references[0];
    let inner = &output.references[1];
    assert!(outer.parent_reference.is_none());
    assert_eq!(inner.parent_reference.as_deref(), Some(outer.id.as_str()));
    assert!(inner.start_offset >= outer.start_offset && inner.end_offset <= outer.end_offset);
}

#[tokio::test]
async fn test_ids_are_deterministic() {
    let pair = TextFragmentPair::new("aux 1° ou 2° du II", "aux 1° ou 2° du II");
    let locator = ReferenceLocator::new(0.6);
    let first = locator.locate(&pair).await;
    let second = locator.locate(&pair).await;
    assert_eq!(first, second);
    // Same text and offset in the two fragments still gets distinct ids.
    assert_ne!(first.references[0].id, first.references[1].id);
}

#[tokio::test]
async fn test_semantic_hits_are_merged() {
    let service = Arc::new(ScriptedService::new(|request| {
        assert_eq!(request.task, SemanticTask::DetectReferences);
        Ok(json!({
            "references": [
                {"text": "aux 1° ou 2° du II", "confidence": 0.95},
                {"text": "ledit arrêté", "confidence": 0.7},
                {"text": "absent du texte", "confidence": 0.9}
            ]
        }))
    }));
    let locator = ReferenceLocator::new(0.6).with_service(guarded(service.clone(), 0));
    let pair = TextFragmentPair::new("les activités mentionnées aux 1° ou 2° du II et ledit arrêté", "");
    let output = locator.locate(&pair).await;

    let texts: Vec<&str> = output
        .references
        .iter()
        .map(|r| r.reference_text.as_str())
        .collect();
    assert_eq!(texts, vec!["aux 1° ou 2° du II", "ledit arrêté"]);
    assert!((output.references[0].confidence - 0.95).abs() < 1e-9);
    assert_eq!(service.count(SemanticTask::DetectReferences), 1);
}

#[tokio::test]
async fn test_service_failure_falls_back_to_patterns() {
    let service = Arc::new(ScriptedService::new(|_| {
        Err(NormRefError::Service {
            message: "unavailable".to_string(),
            task: "detect_references".to_string(),
        })
    }));
    let locator = ReferenceLocator::new(0.6).with_service(guarded(service.clone(), 1));
    let pair = TextFragmentPair::new("les activités mentionnées aux 1° ou 2° du II", "");
    let output = locator.locate(&pair).await;

    assert_eq!(output.references.len(), 1);
    // One attempt plus one retry.
    assert_eq!(service.count(SemanticTask::DetectReferences), 2);
}

#[tokio::test]
async fn test_semantic_detection_can_be_disabled() {
    let service = Arc::new(ScriptedService::new(|_| Ok(json!({"references": []}))));
    let locator = ReferenceLocator::new(0.6)
        .with_service(guarded(service.clone(), 0))
        .semantic_detection(false);
    locator
        .locate(&TextFragmentPair::new("aux 1° ou 2° du II", ""))
        .await;
    assert!(service.calls().is_empty());
}
