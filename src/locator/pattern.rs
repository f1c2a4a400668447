//! Rule-based detection of French legislative citations.
//!
//! Recognised forms include `l'article L. 253-5`, `aux 1° ou 2° du II`,
//! `point 11 de l'article 3 du règlement (UE) 2019/1009`,
//! `règlement (CE) n° 1107/2009`, `directive 2009/128/CE` and the names of
//! the main codes. The same building blocks are reused by the retrieval
//! address parser.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apostrophes seen in legislative text.
const APOS: &str = r"['’]";

/// Article number, optionally prefixed with its code part (`L.`, `R.`, `D.`, `LO`).
pub(crate) const ARTICLE_NUM: &str = r"(?:(?:LO|L|R|D)\.?\s*)?\d+(?:-\d+)*";

pub(crate) const ITEM: &str = r"\d+\s?°";
pub(crate) const ROMAN: &str = r"\b[IVX]+\b";
pub(crate) const LETTER: &str = r"\b[a-z]\)";
pub(crate) const POINT: &str = r"(?i:points?|paragraphes?|alinéas?)\s+\d+(?:\s?°)?";

static PREP: Lazy<String> = Lazy::new(|| format!(r"(?:\b(?:aux|au|à\s+l{a}|à\s+la|l{a})\s*)", a = APOS));

static OF: Lazy<String> =
    Lazy::new(|| format!(r"\s+(?:du|de\s+la|de\s+l{a}|des|de)\s*", a = APOS));

const ALT: &str = r"\s*(?:,|\bou\b|\bet\b)\s*";

pub(crate) static MARKER: Lazy<String> =
    Lazy::new(|| format!("(?:{}|{}|{}|{})", POINT, ITEM, ROMAN, LETTER));

static ARTICLE: Lazy<String> = Lazy::new(|| {
    format!(
        r"(?i:articles?)\s+{n}(?:\s*(?:,|\bet\b|\bou\b|\bà\b)\s*{n})*",
        n = ARTICLE_NUM
    )
});

pub(crate) static SOURCE: Lazy<String> = Lazy::new(|| {
    let regulation = format!(
        r"(?i:règlement)\s+(?:(?i:délégué|d{a}exécution)\s+)?\((?:CE|UE|CEE)\)\s+(?:n°\s*)?\d+/\d+",
        a = APOS
    );
    let directive = r"(?i:directive)\s+(?:\((?:CE|UE)\)\s+)?\d+/\d+(?:/(?:CE|UE|CEE))?";
    let code = format!(
        r"(?i:code)\s+(?:rural\s+et\s+de\s+la\s+pêche\s+maritime|de\s+l{a}environnement|de\s+la\s+santé\s+publique|de\s+la\s+consommation|du\s+travail|civil|pénal|général\s+des\s+impôts)",
        a = APOS
    );
    let law = r"(?i:loi)\s+n°\s*\d+-\d+(?:\s+du\s+\d+(?:er)?\s+\p{L}+\s+\d{4})?";
    format!(
        r"(?:(?i:même)\s+)?(?:{}|{}|{}|{})",
        regulation, directive, code, law
    )
});

/// A source citation, or a bare back-reference such as `même code`.
static SOURCE_REF: Lazy<String> = Lazy::new(|| {
    format!(
        r"(?:{}|(?i:même)\s+(?:code|règlement|directive|loi)\b)",
        *SOURCE
    )
});

static CITATION_RE: Lazy<Regex> = Lazy::new(|| {
    let article = format!(
        r"{prep}?{article}(?:{of}{source})?",
        prep = *PREP,
        article = *ARTICLE,
        of = *OF,
        source = *SOURCE_REF
    );
    let head = format!(r"(?:\b[a-z]\s+(?:du|de)\s+)?{}", *MARKER);
    let chain = format!(
        r"{prep}?{head}(?:{alt}{m})*(?:{of}{m}(?:{alt}{m})*)*(?:{of}(?:(?i:même)\s+)?{article})?(?:{of}{source})?",
        prep = *PREP,
        head = head,
        alt = ALT,
        m = *MARKER,
        of = *OF,
        article = *ARTICLE,
        source = *SOURCE_REF
    );
    let pattern = format!(
        r"(?P<article>{})|(?P<chain>{})|(?P<source>{})",
        article, chain, *SOURCE
    );
    Regex::new(&pattern).expect("citation pattern is valid")
});

pub(crate) static SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&SOURCE_REF).expect("source pattern is valid"));

pub(crate) static ARTICLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i:articles?)\s+(?P<num>{})", ARTICLE_NUM))
        .expect("article pattern is valid")
});

pub(crate) static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&MARKER).expect("marker pattern is valid"));

/// What a pattern hit cites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// An article, possibly with its source.
    Article,
    /// A chain of subdivision markers, possibly anchored to an article or source.
    Subdivision,
    /// A code, regulation, directive or law on its own.
    Source,
}

/// A citation found by [`detect`]. Offsets are byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    pub start: usize,
    pub end: usize,
    pub kind: HitKind,
    pub confidence: f64,
}

/// Scans `text` for citations.
///
/// Top-level hits never overlap each other; source citations nested inside
/// an article or subdivision hit are reported as additional hits.
pub fn detect(text: &str) -> Vec<PatternHit> {
    let mut hits = Vec::new();

    for caps in CITATION_RE.captures_iter(text) {
        let (m, kind) = if let Some(m) = caps.name("article") {
            (m, HitKind::Article)
        } else if let Some(m) = caps.name("chain") {
            (m, HitKind::Subdivision)
        } else if let Some(m) = caps.name("source") {
            (m, HitKind::Source)
        } else {
            continue;
        };

        let matched = m.as_str();
        let confidence = score(kind, matched);
        hits.push(PatternHit {
            start: m.start(),
            end: m.end(),
            kind,
            confidence,
        });

        if kind != HitKind::Source {
            for nested in SOURCE_RE.find_iter(matched) {
                hits.push(PatternHit {
                    start: m.start() + nested.start(),
                    end: m.start() + nested.end(),
                    kind: HitKind::Source,
                    confidence: 0.8,
                });
            }
        }
    }

    hits
}

/// Confidence from the shape of the citation.
///
/// Anchored citations (an article or a named source) are reliable; a chain
/// of markers is fairly reliable; a single bare marker such as `au IV` is
/// often a false positive.
fn score(kind: HitKind, matched: &str) -> f64 {
    let has_source = SOURCE_RE.is_match(matched);
    let has_article = ARTICLE_RE.is_match(matched);
    match kind {
        HitKind::Source => 0.8,
        HitKind::Article if has_source => 0.9,
        HitKind::Article => 0.85,
        HitKind::Subdivision if has_source || has_article => 0.9,
        HitKind::Subdivision => {
            if MARKER_RE.find_iter(matched).count() >= 2 {
                0.75
            } else {
                0.4
            }
        }
    }
}
