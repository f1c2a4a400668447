use crate::types::{LinkedReference, LocatedReference};

use super::resolution_question;

/// Words skipped when walking back from a reference towards its antecedent:
/// participles introducing a citation, prepositions, articles, pronouns.
const SKIP_WORDS: &[&str] = &[
    "mentionné", "mentionnée", "mentionnés", "mentionnées", "visé", "visée", "visés", "visées",
    "prévu", "prévue", "prévus", "prévues", "défini", "définie", "définis", "définies", "cité",
    "citée", "cités", "citées", "énuméré", "énumérée", "énumérés", "énumérées", "sens", "au",
    "aux", "du", "des", "de", "la", "le", "les", "l", "d", "à", "par", "dans", "en", "sur",
    "celui", "celle", "ceux", "celles", "ou", "et", "conformément", "application", "relevant",
    "relatif", "relative", "relatifs", "relatives", "que", "qui", "est", "sont",
];

const PARTICIPLE_STEMS: &[&str] = &[
    "mentionn", "vis", "prév", "défini", "cit", "énumér", "relati",
];

/// How far back the antecedent search goes, in words.
const MAX_LOOKBACK: usize = 12;

pub(crate) const PROXIMITY_CONFIDENCE: f64 = 0.65;
pub(crate) const AGREEMENT_CONFIDENCE: f64 = 0.75;
pub(crate) const UNBOUND_CONFIDENCE: f64 = 0.3;

/// Binds `located` to the nearest content word before it.
///
/// The fragment is searched first. When the reference opens the fragment, the
/// search continues in `context_text` just before where the fragment sits in
/// it, since the antecedent then lives in the surrounding article.
pub fn link_by_proximity(
    located: &LocatedReference,
    fragment: &str,
    context_text: &str,
) -> LinkedReference {
    let before = fragment.get(..located.start_offset).unwrap_or_default();
    let mut found = antecedent(before);

    if found.is_none() && !fragment.is_empty() {
        if let Some(pos) = context_text.find(fragment) {
            let cut = pos + located.start_offset;
            found = antecedent(context_text.get(..cut).unwrap_or_default());
        }
    }

    match found {
        Some(Antecedent { object, participle }) => {
            let (rationale, confidence) = match participle {
                Some(p) if is_plural(&p) == is_plural(&object) => (
                    format!(
                        "proximity: nearest noun before '{}'; number agreement ({})",
                        p,
                        if is_plural(&object) { "plural" } else { "singular" }
                    ),
                    AGREEMENT_CONFIDENCE,
                ),
                Some(p) => (
                    format!("proximity: nearest noun before '{}'; number disagrees", p),
                    PROXIMITY_CONFIDENCE,
                ),
                None => (
                    "proximity: nearest noun before the reference".to_string(),
                    PROXIMITY_CONFIDENCE,
                ),
            };
            LinkedReference {
                resolution_question: resolution_question(&located.reference_text, &object),
                located: located.clone(),
                object,
                agreement_rationale: rationale,
                confidence,
            }
        }
        None => LinkedReference {
            resolution_question: resolution_question(&located.reference_text, ""),
            located: located.clone(),
            object: String::new(),
            agreement_rationale: "no antecedent found".to_string(),
            confidence: UNBOUND_CONFIDENCE,
        },
    }
}

struct Antecedent {
    object: String,
    participle: Option<String>,
}

fn antecedent(text: &str) -> Option<Antecedent> {
    let words: Vec<&str> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();

    let mut participle: Option<String> = None;
    for word in words.iter().rev().take(MAX_LOOKBACK) {
        let lower = word.to_lowercase();
        if SKIP_WORDS.contains(&lower.as_str()) {
            if participle.is_none() && PARTICIPLE_STEMS.iter().any(|s| lower.starts_with(s)) {
                participle = Some(lower);
            }
            continue;
        }
        if lower.chars().count() < 3 || lower.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }
        return Some(Antecedent {
            object: word.to_string(),
            participle,
        });
    }
    None
}

fn is_plural(word: &str) -> bool {
    word.ends_with('s') || word.ends_with('x')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{generate_reference_id, SourceTag};

    fn located(fragment: &str, reference: &str) -> LocatedReference {
        let start = fragment.find(reference).unwrap();
        LocatedReference {
            id: generate_reference_id("", SourceTag::Deletional, start, reference),
            reference_text: reference.to_string(),
            start_offset: start,
            end_offset: start + reference.len(),
            source_tag: SourceTag::Deletional,
            confidence: 0.75,
            parent_reference: None,
        }
    }

    #[test]
    fn test_skips_participle_and_checks_number() {
        let fragment = "incompatible avec celui des activités mentionnées aux 1° ou 2° du II";
        let linked = link_by_proximity(&located(fragment, "aux 1° ou 2° du II"), fragment, "");
        assert_eq!(linked.object, "activités");
        assert!(linked.agreement_rationale.contains("plural"));
        assert!((linked.confidence - AGREEMENT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_au_sens_de() {
        let fragment = "le producteur au sens de l'article 47";
        let linked = link_by_proximity(&located(fragment, "l'article 47"), fragment, "");
        assert_eq!(linked.object, "producteur");
    }

    #[test]
    fn test_falls_back_to_context_when_reference_opens_fragment() {
        let fragment = "aux 1° ou 2° du II";
        let context = "Les distributeurs mentionnés aux 1° ou 2° du II tiennent un registre.";
        let linked = link_by_proximity(&located(fragment, fragment), fragment, context);
        assert_eq!(linked.object, "distributeurs");
    }

    #[test]
    fn test_unbound_reference_has_low_confidence() {
        let fragment = "au II";
        let linked = link_by_proximity(&located(fragment, "au II"), fragment, "");
        assert!(linked.object.is_empty());
        assert!(linked.confidence < 0.5);
    }
}
