use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::locator::pattern::{ARTICLE_NUM, ARTICLE_RE, MARKER_RE, SOURCE_RE};

use super::hierarchy::{normalize_article_id, parse_roman, Marker};
use super::RetrievalScope;

/// Separator between two markers that descends one level (`2° du II`).
static OF_SEP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+(?:du|de\s+la|de\s+l['’]|des|de)\s*$").expect("separator pattern is valid")
});

/// A lettered item cited without its parenthesis: `a du 3°`.
static BARE_LETTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?P<letter>[a-z])\s+(?:du|de)\s+").expect("letter pattern is valid"));

static BACK_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:même)\s+(?:code|règlement|directive|loi)$").expect("back-reference pattern is valid")
});

static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^(?i:articles?)\s+(?P<num>{})(?P<rest>.*)$", ARTICLE_NUM))
        .expect("unit pattern is valid")
});

/// Where the content of a citation lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceAddress {
    /// A subdivision of the article the citation was found in.
    Internal { path: Vec<Vec<Marker>> },
    /// A unit of another document. `unit_id` is `None` when the whole source is cited.
    External {
        source_id: String,
        unit_id: Option<String>,
        sub_path: Vec<Vec<Marker>>,
    },
    /// Nothing in the citation can be looked up.
    Unaddressable,
}

/// Parses `reference_text` relative to the article it was found in.
///
/// Marker paths are ordered from the outermost level inwards: `aux 1° ou 2°
/// du II` becomes `[[II], [1°, 2°]]`. An article citation without a source
/// points into the scope's own source; `même code` and the like name the
/// scope's source explicitly.
pub fn parse_address(reference_text: &str, scope: &RetrievalScope) -> ReferenceAddress {
    let article = ARTICLE_RE.captures(reference_text);
    let source = SOURCE_RE.find(reference_text);

    let anchor = [
        article.as_ref().and_then(|c| c.get(0)).map(|m| m.start()),
        source.map(|m| m.start()),
    ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(reference_text.len());
    let path = marker_path(&reference_text[..anchor]);

    let source_id = match source {
        Some(m) if BACK_REFERENCE_RE.is_match(m.as_str().trim()) => {
            scope.source_id.as_deref().map(normalize_source_id)
        }
        Some(m) => Some(normalize_source_id(m.as_str())),
        None => None,
    };

    match (article.and_then(|c| c.name("num")), source_id) {
        (Some(num), source_id) => {
            let article_id = normalize_article_id(num.as_str());
            let same_source = match (&source_id, &scope.source_id) {
                (None, _) => true,
                (Some(a), Some(b)) => *a == normalize_source_id(b),
                (Some(_), None) => false,
            };
            if same_source && article_id == normalize_article_id(&scope.article_id) {
                return ReferenceAddress::Internal { path };
            }
            ReferenceAddress::External {
                source_id: source_id
                    .or_else(|| scope.source_id.as_deref().map(normalize_source_id))
                    .unwrap_or_default(),
                unit_id: Some(format!("article {}", article_id)),
                sub_path: path,
            }
        }
        (None, Some(source_id)) => ReferenceAddress::External {
            source_id,
            unit_id: None,
            sub_path: path,
        },
        (None, None) if !path.is_empty() => ReferenceAddress::Internal { path },
        (None, None) => ReferenceAddress::Unaddressable,
    }
}

/// Groups the markers of `head` into levels and orders them outermost first.
fn marker_path(head: &str) -> Vec<Vec<Marker>> {
    let mut tokens: Vec<(usize, usize, Marker)> = MARKER_RE
        .find_iter(head)
        .filter_map(|m| token_marker(m.as_str()).map(|marker| (m.start(), m.end(), marker)))
        .collect();

    if let Some(caps) = BARE_LETTER_RE.captures(head) {
        if let (Some(letter), Some(whole)) = (caps.name("letter"), caps.get(0)) {
            let before_first = tokens.first().map(|t| whole.end() <= t.0).unwrap_or(false);
            if before_first {
                if let Some(c) = letter.as_str().chars().next() {
                    tokens.insert(0, (letter.start(), letter.end(), Marker::Letter(c)));
                }
            }
        }
    }

    let mut groups: Vec<Vec<Marker>> = Vec::new();
    let mut prev_end: Option<usize> = None;
    for (start, end, marker) in tokens {
        let descends = prev_end
            .map(|p| OF_SEP_RE.is_match(&head[p..start]))
            .unwrap_or(true);
        match groups.last_mut() {
            Some(group) if !descends => group.push(marker),
            _ => groups.push(vec![marker]),
        }
        prev_end = Some(end);
    }
    groups.reverse();
    groups
}

fn token_marker(token: &str) -> Option<Marker> {
    let t = token.trim();
    if let Some(num) = t.strip_suffix('°') {
        // `point 3°` is an item as well.
        let digits: String = num.chars().filter(char::is_ascii_digit).collect();
        return digits.parse().ok().map(Marker::Item);
    }
    if let Some(letter) = t.strip_suffix(')') {
        let mut chars = letter.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_lowercase() => Some(Marker::Letter(c)),
            _ => None,
        };
    }
    if let Some(n) = parse_roman(t) {
        return Some(Marker::Roman(n));
    }
    let digits: String = t.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok().map(Marker::Numbered)
}

/// Canonical form of a source name: lowercase, single spaces, straight
/// apostrophes, without a leading `même`.
pub fn normalize_source_id(raw: &str) -> String {
    let collapsed = collapse(&raw.replace('’', "'").to_lowercase());
    collapsed
        .strip_prefix("même ")
        .map(str::to_string)
        .unwrap_or(collapsed)
}

/// Canonical form of a unit id. Article numbers are normalised so that
/// `article L. 253-5` and `article L253-5` name the same unit.
pub fn normalize_unit_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match UNIT_RE.captures(trimmed) {
        Some(caps) => {
            let num = caps.name("num").map(|m| m.as_str()).unwrap_or_default();
            let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
            collapse(&format!("article {}{}", normalize_article_id(num), rest).to_lowercase())
        }
        None => collapse(&trimmed.to_lowercase()),
    }
}

/// Id of the sub-unit `path` inside `unit`, e.g. `article 3, point 11`.
pub fn sub_unit_id(unit: &str, path: &[Vec<Marker>]) -> String {
    let mut id = unit.to_string();
    for level in path.iter().filter(|l| !l.is_empty()) {
        id.push_str(", ");
        id.push_str(
            &level
                .iter()
                .map(Marker::label)
                .collect::<Vec<_>>()
                .join(" ou "),
        );
    }
    id
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
