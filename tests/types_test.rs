use normref::types::*;

#[test]
fn source_tag_as_str_roundtrip() {
    for tag in [SourceTag::Deletional, SourceTag::Definitional] {
        let s = tag.as_str();
        let parsed =
            SourceTag::from_str(s).unwrap_or_else(|| panic!("failed to parse SourceTag from '{}'", s));
        assert_eq!(tag, parsed, "roundtrip failed for SourceTag::{}", s);
    }
    assert!(SourceTag::from_str("deletional").is_none());
    assert!(SourceTag::from_str("").is_none());
}

#[test]
fn issue_kind_as_str_roundtrip() {
    let kinds = vec![
        IssueKind::LowConfidenceDetection,
        IssueKind::LinkingAmbiguous,
        IssueKind::RetrievalNotFound,
        IssueKind::RetrievalTimeout,
        IssueKind::ExtractionEmpty,
        IssueKind::CycleDetected,
        IssueKind::DepthExceeded,
        IssueKind::MatchNotFoundInFragment,
        IssueKind::Supplementary,
        IssueKind::AmbiguousSkipped,
        IssueKind::BudgetExhausted,
        IssueKind::ServiceFailure,
    ];

    for kind in kinds {
        let s = kind.as_str();
        let parsed =
            IssueKind::from_str(s).unwrap_or_else(|| panic!("failed to parse IssueKind from '{}'", s));
        assert_eq!(kind, parsed, "roundtrip failed for IssueKind::{}", s);
    }
    assert!(IssueKind::from_str("unknown_issue").is_none());
}

#[test]
fn only_intentional_skips_are_skips() {
    assert!(IssueKind::Supplementary.is_skip());
    assert!(IssueKind::AmbiguousSkipped.is_skip());
    assert!(IssueKind::CycleDetected.is_skip());
    assert!(!IssueKind::RetrievalNotFound.is_skip());
    assert!(!IssueKind::BudgetExhausted.is_skip());
}

#[test]
fn render_mode_as_str_roundtrip() {
    for mode in [RenderMode::Footnote, RenderMode::Inline, RenderMode::None] {
        assert_eq!(RenderMode::from_str(mode.as_str()), Some(mode));
    }
    assert_eq!(RenderMode::default(), RenderMode::Footnote);
    assert!(RenderMode::from_str("margin").is_none());
}

#[test]
fn fragment_follows_tag() {
    let pair = TextFragmentPair::new("ancien", "nouveau");
    assert_eq!(pair.fragment(SourceTag::Deletional), "ancien");
    assert_eq!(pair.fragment(SourceTag::Definitional), "nouveau");
}

#[test]
fn reference_id_is_deterministic() {
    let a = generate_reference_id("", SourceTag::Deletional, 12, "au II");
    let b = generate_reference_id("", SourceTag::Deletional, 12, "au II");
    assert_eq!(a, b);
    assert!(a.starts_with("ref:"));
    assert_eq!(a.len(), "ref:".len() + 16);
}

#[test]
fn reference_id_distinguishes_every_component() {
    let base = generate_reference_id("", SourceTag::Deletional, 12, "au II");
    assert_ne!(base, generate_reference_id("", SourceTag::Definitional, 12, "au II"));
    assert_ne!(base, generate_reference_id("", SourceTag::Deletional, 13, "au II"));
    assert_ne!(base, generate_reference_id("", SourceTag::Deletional, 12, "au III"));
    assert_ne!(base, generate_reference_id("ref:parent", SourceTag::Deletional, 12, "au II"));
}

#[test]
fn serde_names() {
    assert_eq!(
        serde_json::to_string(&SourceTag::Definitional).unwrap(),
        "\"DEFINITIONAL\""
    );
    assert_eq!(serde_json::to_string(&RenderMode::Inline).unwrap(), "\"inline\"");
    assert_eq!(
        serde_json::to_string(&ResolutionStatus::Partial).unwrap(),
        "\"PARTIAL\""
    );
}
