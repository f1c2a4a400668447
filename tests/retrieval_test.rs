mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use normref::errors::NormRefError;
use normref::retrieval::hierarchy::Marker;
use normref::retrieval::{
    carve, ContentRetrievalStrategy, DirectoryDocumentSource, InMemoryDocumentSource,
    RetrievalScope,
};
use normref::semantic::SemanticTask;
use normref::types::*;
use serde_json::json;

/// Regulation 1107/2009 as one document, with numbered points in article 3.
const REGULATION_FULL: &str = "\
Article 2
Champ d'application
1. Le présent règlement s'applique aux produits phytopharmaceutiques.
Article 3
Définitions
Aux fins du présent règlement, on entend par :
(9) « mise sur le marché » : la détention en vue de la vente à l'intérieur de la Communauté, y compris l'offre en vue de la vente ou toute autre forme de cession, à titre gratuit ou onéreux, ainsi que la vente, la distribution et les autres formes de cession proprement dites, à l'exception de la restitution au vendeur précédent ;
(10) « autorisation d'un produit phytopharmaceutique » : un acte administratif par lequel l'autorité compétente d'un État membre autorise la mise sur le marché d'un produit phytopharmaceutique sur son territoire ;
(11) « producteur » : une personne qui fabrique elle-même des produits phytopharmaceutiques ;
(12) « lettre d'accès » : un document original par lequel le ou les propriétaires de données protégées consentent à l'utilisation de ces données.
Article 4
Critères d'approbation des substances actives
1. Une substance active est approuvée conformément à l'annexe II.
";

fn scope(tag: SourceTag) -> RetrievalScope {
    RetrievalScope::for_article(&article_context(), tag)
}

fn reference(text: &str, tag: SourceTag) -> LinkedReference {
    let fragment = format!("le producteur {}", text);
    linked(located_in(&fragment, text, tag, 0.9), "producteur")
}

fn strategy(documents: InMemoryDocumentSource) -> ContentRetrievalStrategy {
    ContentRetrievalStrategy::new(Arc::new(documents), unlimited_guard(0))
}

#[tokio::test]
async fn test_internal_carve_uses_tagged_context() {
    let strategy = strategy(InMemoryDocumentSource::new());
    let r = reference("aux 1° ou 2° du II", SourceTag::Deletional);

    let before = strategy.retrieve(&r, &scope(SourceTag::Deletional)).await.unwrap();
    assert!(before.content.contains("distribution à titre gratuit"));
    assert_eq!(before.metadata["strategy"], "internal_carve");
    assert_eq!(before.metadata["widened_retry"], "false");

    let after = strategy.retrieve(&r, &scope(SourceTag::Definitional)).await.unwrap();
    assert!(!after.content.contains("distribution à titre gratuit"));
    assert!(after.content.contains("L'application des produits"));
}

#[tokio::test]
async fn test_direct_sub_unit_fetch_is_preferred() {
    let documents = InMemoryDocumentSource::new()
        .with(REGULATION, "article 3, point 11", "(11) « producteur » : sous-unité directe")
        .with(REGULATION, "", REGULATION_FULL);
    let r = reference(
        "du point 11 de l'article 3 du règlement (CE) n° 1107/2009",
        SourceTag::Definitional,
    );
    let retrieved = strategy(documents)
        .retrieve(&r, &scope(SourceTag::Definitional))
        .await
        .unwrap();

    assert_eq!(retrieved.content, "(11) « producteur » : sous-unité directe");
    assert_eq!(retrieved.metadata["strategy"], "direct_fetch");
    assert_eq!(retrieved.metadata["sub_unit"], "point 11");
    assert_eq!(retrieved.unit_scope.article_id, "3");
}

#[tokio::test]
async fn test_parent_unit_is_carved_when_sub_unit_missing() {
    let article_3 = REGULATION_FULL
        .split("Article 4")
        .next()
        .unwrap()
        .split_once("Article 3")
        .map(|(_, rest)| format!("Article 3{}", rest))
        .unwrap();
    let documents = InMemoryDocumentSource::new().with(REGULATION, "article 3", article_3);
    let r = reference(
        "du point 11 de l'article 3 du règlement (CE) n° 1107/2009",
        SourceTag::Definitional,
    );
    let retrieved = strategy(documents)
        .retrieve(&r, &scope(SourceTag::Definitional))
        .await
        .unwrap();

    assert!(retrieved.content.starts_with("(11) « producteur »"));
    assert!(!retrieved.content.contains("(12)"));
    assert_eq!(retrieved.metadata["strategy"], "parent_carve");
}

#[tokio::test]
async fn test_enclosing_source_is_carved_last() {
    let documents = InMemoryDocumentSource::new().with(REGULATION, "", REGULATION_FULL);
    let r = reference(
        "du point 11 de l'article 3 du règlement (CE) n° 1107/2009",
        SourceTag::Definitional,
    );
    let retrieved = strategy(documents)
        .retrieve(&r, &scope(SourceTag::Definitional))
        .await
        .unwrap();

    assert!(retrieved.content.starts_with("(11) « producteur »"));
    assert_eq!(retrieved.metadata["strategy"], "enclosing_carve");
    assert!(retrieved.unit_scope.text.starts_with("Article 3"));
    assert!(!retrieved.unit_scope.text.contains("Article 4"));
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let r = reference("à l'article L. 253-5 du même code", SourceTag::Deletional);
    let failure = strategy(InMemoryDocumentSource::new())
        .retrieve(&r, &scope(SourceTag::Deletional))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, IssueKind::RetrievalNotFound);
}

#[tokio::test]
async fn test_empty_answer_is_retried_on_widened_window() {
    let service = Arc::new(ScriptedService::new(|request| {
        assert_eq!(request.task, SemanticTask::ExtractAnswer);
        // Only the widened window reaches the preceding definition.
        if request.input.contains("(10)") {
            Ok(json!({"answer": "une personne qui fabrique elle-même des produits"}))
        } else {
            Ok(json!({"answer": "  "}))
        }
    }));
    let documents = InMemoryDocumentSource::new().with(REGULATION, "", REGULATION_FULL);
    let strategy = strategy(documents)
        .with_extractor(guarded(service.clone(), 0))
        .widen_window(300);
    let r = reference(
        "du point 11 de l'article 3 du règlement (CE) n° 1107/2009",
        SourceTag::Definitional,
    );
    let retrieved = strategy
        .retrieve(&r, &scope(SourceTag::Definitional))
        .await
        .unwrap();

    assert_eq!(retrieved.content, "une personne qui fabrique elle-même des produits");
    assert_eq!(retrieved.metadata["widened_retry"], "true");
    assert_eq!(retrieved.metadata["extraction"], "service");
    assert_eq!(service.count(SemanticTask::ExtractAnswer), 2);
}

#[tokio::test]
async fn test_empty_answer_without_major_carve_is_not_retried() {
    let service = Arc::new(ScriptedService::new(|_| Ok(json!({"answer": ""}))));
    let documents = InMemoryDocumentSource::new().with(
        CODE,
        "article L. 253-5",
        "Les produits mentionnés au présent article sont soumis à autorisation.",
    );
    let strategy = strategy(documents).with_extractor(guarded(service.clone(), 0));
    let r = reference("à l'article L. 253-5 du même code", SourceTag::Deletional);
    let failure = strategy
        .retrieve(&r, &scope(SourceTag::Deletional))
        .await
        .unwrap_err();

    assert_eq!(failure.kind, IssueKind::ExtractionEmpty);
    assert_eq!(service.count(SemanticTask::ExtractAnswer), 1);
}

#[tokio::test(start_paused = true)]
async fn test_extraction_timeout_is_reported() {
    let service = Arc::new(
        ScriptedService::new(|_| Ok(json!({"answer": "trop tard"}))).with_delay(Duration::from_secs(30)),
    );
    let strategy = strategy(InMemoryDocumentSource::new()).with_extractor(guarded(service, 0));
    let r = reference("aux 1° ou 2° du II", SourceTag::Deletional);
    let failure = strategy
        .retrieve(&r, &scope(SourceTag::Deletional))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, IssueKind::RetrievalTimeout);
}

#[tokio::test]
async fn test_extraction_service_failure() {
    let service = Arc::new(ScriptedService::new(|_| {
        Err(NormRefError::Service {
            message: "overloaded".to_string(),
            task: "extract_answer".to_string(),
        })
    }));
    let strategy = strategy(InMemoryDocumentSource::new()).with_extractor(guarded(service, 0));
    let r = reference("aux 1° ou 2° du II", SourceTag::Deletional);
    let failure = strategy
        .retrieve(&r, &scope(SourceTag::Deletional))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, IssueKind::ServiceFailure);
}

#[tokio::test]
async fn test_directory_source_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let documents = DirectoryDocumentSource::new(dir.path());
    let path = documents.path_for(CODE, "article L. 253-5");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "Les produits sont soumis à autorisation.").unwrap();

    let strategy = ContentRetrievalStrategy::new(Arc::new(documents), unlimited_guard(0));
    let r = reference("à l'article L. 253-5 du même code", SourceTag::Deletional);
    let retrieved = strategy
        .retrieve(&r, &scope(SourceTag::Deletional))
        .await
        .unwrap();
    assert_eq!(retrieved.content, "Les produits sont soumis à autorisation.");
    assert_eq!(retrieved.metadata["strategy"], "direct_fetch");
}

#[test]
fn test_carve_numbered_points() {
    let carved = carve(
        REGULATION_FULL,
        &[vec![Marker::Article("3".to_string())], vec![Marker::Numbered(11)]],
    )
    .unwrap();
    assert!(carved.text.starts_with("(11)"));
    assert!(carved.text.ends_with("produits phytopharmaceutiques ;"));
    assert!(carved.len() * 2 <= REGULATION_FULL.len());
}
