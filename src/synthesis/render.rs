use crate::types::SourceTag;

/// Collapses every whitespace run, newlines included, into one space.
pub fn compact(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_chars` characters, ending with `…` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

/// Marker inserted in place of a footnoted reference.
pub fn footnote_marker(index: usize) -> String {
    format!("[{}]", index)
}

/// One line of the footnote list: `n. reference → object: content (TAG)`.
pub fn footnote_entry(
    index: usize,
    reference_text: &str,
    object: &str,
    content: &str,
    tag: SourceTag,
    max_len: usize,
) -> String {
    let content = truncate(&compact(content), max_len);
    if object.is_empty() {
        format!("{}. {}: {} ({})", index, reference_text, content, tag.as_str())
    } else {
        format!(
            "{}. {} → {}: {} ({})",
            index,
            reference_text,
            object,
            content,
            tag.as_str()
        )
    }
}

/// Inline rendering of a matched reference: `match (object: content)`.
pub fn inline_annotation(matched: &str, object: &str, content: &str) -> String {
    let content = compact(content);
    if object.is_empty() {
        format!("{} ({})", matched, content)
    } else {
        format!("{} ({}: {})", matched, object, content)
    }
}
