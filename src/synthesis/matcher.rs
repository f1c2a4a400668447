/// Punctuation tolerated around a reference text.
const EDGE_PUNCTUATION: &[char] = &[',', ';', ':', '.', '!', '?'];

/// Byte spans of every non-overlapping occurrence of `needle` in `haystack`.
///
/// Exact occurrences are preferred. When there are none, both strings are
/// normalised (whitespace runs collapsed, curly and angle quotes mapped to
/// straight ones, edge punctuation of the needle dropped) and the
/// occurrences found are mapped back onto `haystack`.
pub fn find_occurrences(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    if needle.is_empty() || haystack.is_empty() {
        return Vec::new();
    }
    let exact: Vec<(usize, usize)> = haystack
        .match_indices(needle)
        .map(|(start, m)| (start, start + m.len()))
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let norm_needle = Normalized::new(needle);
    let key = norm_needle
        .text
        .trim_matches(|c: char| c.is_whitespace() || EDGE_PUNCTUATION.contains(&c));
    if key.is_empty() {
        return Vec::new();
    }

    let norm_haystack = Normalized::new(haystack);
    norm_haystack
        .text
        .match_indices(key)
        .filter_map(|(start, m)| norm_haystack.to_original(start, start + m.len()))
        .collect()
}

/// Maps a quote-like character to its canonical form.
pub fn canonical_quote(c: char) -> char {
    match c {
        '’' | '‘' | '‛' | '′' | '`' => '\'',
        '“' | '”' | '„' | '«' | '»' | '″' => '"',
        other => other,
    }
}

/// A normalised copy of a text that remembers where each character came from.
struct Normalized {
    text: String,
    /// `(normalised start, original start, original end)` per normalised char.
    spans: Vec<(usize, usize, usize)>,
}

impl Normalized {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut spans: Vec<(usize, usize, usize)> = Vec::with_capacity(original.len());
        let mut in_space = false;

        for (i, c) in original.char_indices() {
            let end = i + c.len_utf8();
            if c.is_whitespace() {
                if in_space {
                    if let Some(last) = spans.last_mut() {
                        last.2 = end;
                    }
                    continue;
                }
                in_space = true;
                spans.push((text.len(), i, end));
                text.push(' ');
                continue;
            }
            in_space = false;
            spans.push((text.len(), i, end));
            text.push(canonical_quote(c));
        }

        Self { text, spans }
    }

    fn to_original(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let first = self.spans.binary_search_by_key(&start, |s| s.0).ok()?;
        let last = self.spans.partition_point(|s| s.0 < end).checked_sub(1)?;
        Some((self.spans[first].1, self.spans[last].2))
    }
}
