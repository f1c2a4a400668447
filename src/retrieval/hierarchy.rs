use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static LINE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)^[ \t]*(?:",
        r"(?:Article|ARTICLE|Art\.)\s+(?P<article>(?:(?:LO|L|R|D)\.?\s*)?\d+(?:-\d+)*)",
        r"|(?P<roman>[IVX]+)\s*(?:\.|-|–|—)",
        r"|(?P<item>\d+)\s?°",
        r"|\(?(?P<numbered>\d+)[.)]\s",
        r"|\(?(?P<letter>[a-z])\)\s",
        r")"
    ))
    .expect("line marker pattern is valid")
});

/// A subdivision marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// Normalised article number, e.g. `"L253-5"` or `"47"`.
    Article(String),
    Roman(u32),
    /// A numbered point or paragraph: `11)`, `(11)`, `11.`.
    Numbered(u32),
    /// An arabic item: `1°`.
    Item(u32),
    Letter(char),
}

impl Marker {
    /// Nesting level; lower is higher in the hierarchy.
    pub fn level(&self) -> u8 {
        match self {
            Marker::Article(_) => 0,
            Marker::Roman(_) => 1,
            Marker::Numbered(_) => 2,
            Marker::Item(_) => 3,
            Marker::Letter(_) => 4,
        }
    }

    /// Returns `true` if a marker found in the text satisfies this wanted marker.
    ///
    /// Numbered points and arabic items with the same number are
    /// interchangeable, since texts and citations mix the two notations.
    pub fn matches(&self, found: &Marker) -> bool {
        match (self, found) {
            (Marker::Numbered(a), Marker::Item(b)) | (Marker::Item(a), Marker::Numbered(b)) => {
                a == b
            }
            _ => self == found,
        }
    }

    /// Human-readable label used in unit identifiers.
    pub fn label(&self) -> String {
        match self {
            Marker::Article(id) => format!("article {}", id),
            Marker::Roman(n) => to_roman(*n),
            Marker::Numbered(n) => format!("point {}", n),
            Marker::Item(n) => format!("{}°", n),
            Marker::Letter(c) => format!("{})", c),
        }
    }
}

/// Normalises an article number: drops spaces and dots, uppercases the prefix.
///
/// `"L. 253-5"` and `"l253-5"` both become `"L253-5"`.
pub fn normalize_article_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Parses a Roman numeral made of `I`, `V` and `X`.
pub fn parse_roman(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let values: Vec<u32> = s
        .chars()
        .map(|c| match c {
            'I' => Some(1),
            'V' => Some(5),
            'X' => Some(10),
            _ => None,
        })
        .collect::<Option<Vec<u32>>>()?;

    let mut total = 0;
    for (i, v) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if next > v => total -= *v as i64,
            _ => total += *v as i64,
        }
    }
    u32::try_from(total).ok().filter(|n| *n > 0)
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, digits) in TABLE {
        while n >= *value {
            out.push_str(digits);
            n -= value;
        }
    }
    out
}

/// A marker opening a line of the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLine {
    pub marker: Marker,
    /// Byte offset of the start of the line.
    pub start: usize,
}

/// Lists every line-opening marker of `text`, in order.
pub fn scan(text: &str) -> Vec<MarkerLine> {
    LINE_MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let marker = if let Some(m) = caps.name("article") {
                Marker::Article(normalize_article_id(m.as_str()))
            } else if let Some(m) = caps.name("roman") {
                Marker::Roman(parse_roman(m.as_str())?)
            } else if let Some(m) = caps.name("item") {
                Marker::Item(m.as_str().parse().ok()?)
            } else if let Some(m) = caps.name("numbered") {
                Marker::Numbered(m.as_str().parse().ok()?)
            } else if let Some(m) = caps.name("letter") {
                Marker::Letter(m.as_str().chars().next()?)
            } else {
                return None;
            };
            Some(MarkerLine { marker, start })
        })
        .collect()
}

/// The result of carving: the unit text and its envelope in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carved {
    pub text: String,
    /// Byte range in the source covering every carved piece.
    pub start: usize,
    pub end: usize,
}

impl Carved {
    /// The whole of `text`, uncarved.
    pub fn whole(text: &str) -> Self {
        Self {
            text: text.to_string(),
            start: 0,
            end: text.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Carves the unit named by `path` out of `text`.
///
/// `path` lists hierarchy levels from the outermost inwards; each level holds
/// one or more alternatives (`1° ou 2°`), every one of which is carved. When
/// a level has several alternatives, the next level searches the envelope
/// that covers them. Returns `None` if any level has no match.
pub fn carve(text: &str, path: &[Vec<Marker>]) -> Option<Carved> {
    let lines = scan(text);
    let mut span: Range<usize> = 0..text.len();
    let mut pieces: Vec<Range<usize>> = vec![span.clone()];

    for level in path.iter().filter(|l| !l.is_empty()) {
        let mut found: Vec<Range<usize>> = level
            .iter()
            .filter_map(|wanted| unit_span(&lines, &span, wanted))
            .collect();
        if found.is_empty() {
            return None;
        }
        found.sort_by_key(|r| r.start);
        found.dedup();

        let start = found.first().map(|r| r.start)?;
        let end = found.iter().map(|r| r.end).max()?;
        span = start..end;
        pieces = found;
    }

    let carved_text = pieces
        .iter()
        .map(|r| text[r.clone()].trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Some(Carved {
        text: carved_text,
        start: span.start,
        end: span.end,
    })
}

/// Span of the first unit inside `span` opened by a marker matching `wanted`.
fn unit_span(lines: &[MarkerLine], span: &Range<usize>, wanted: &Marker) -> Option<Range<usize>> {
    let idx = lines
        .iter()
        .position(|l| span.contains(&l.start) && wanted.matches(&l.marker))?;
    let head = &lines[idx];
    let end = lines[idx + 1..]
        .iter()
        .take_while(|l| l.start < span.end)
        .find(|l| l.marker.level() <= head.marker.level())
        .map(|l| l.start)
        .unwrap_or(span.end);
    Some(head.start..end)
}

/// Grows `start..end` by `window` bytes on each side, snapped outwards to
/// char boundaries and clamped to `text`.
pub fn widen(text: &str, start: usize, end: usize, window: usize) -> Range<usize> {
    let mut s = start.saturating_sub(window).min(text.len());
    while s > 0 && !text.is_char_boundary(s) {
        s -= 1;
    }
    let mut e = end.saturating_add(window).min(text.len());
    while e < text.len() && !text.is_char_boundary(e) {
        e += 1;
    }
    s..e
}
