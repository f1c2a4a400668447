use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{NormRefError, Result};

use super::address::{normalize_source_id, normalize_unit_id};

/// Provides the text of a unit of a legal source.
///
/// `unit_id` is an article (`"article L253-5"`), a sub-unit
/// (`"article 3, point 11"`) or empty for the whole source. `Ok(None)` means
/// the source does not know that unit; `Err` is reserved for failures of the
/// source itself.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, source_id: &str, unit_id: &str) -> Result<Option<String>>;
}

/// Documents held in memory, keyed by normalised source and unit ids.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentSource {
    documents: HashMap<(String, String), String>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit; an empty `unit_id` stores the whole source.
    pub fn insert(&mut self, source_id: &str, unit_id: &str, text: impl Into<String>) {
        self.documents.insert(
            (normalize_source_id(source_id), normalize_unit_id(unit_id)),
            text.into(),
        );
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, source_id: &str, unit_id: &str, text: impl Into<String>) -> Self {
        self.insert(source_id, unit_id, text);
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch(&self, source_id: &str, unit_id: &str) -> Result<Option<String>> {
        let key = (normalize_source_id(source_id), normalize_unit_id(unit_id));
        Ok(self.documents.get(&key).cloned())
    }
}

/// Documents stored as text files under a root directory.
///
/// A unit lives at `<root>/<slug(source)>/<slug(unit)>.txt`; the whole
/// source lives at `<root>/<slug(source)>/_full.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSource {
    root: PathBuf,
}

impl DirectoryDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that holds `unit_id` of `source_id`.
    pub fn path_for(&self, source_id: &str, unit_id: &str) -> PathBuf {
        let unit = normalize_unit_id(unit_id);
        let file = if unit.is_empty() {
            "_full".to_string()
        } else {
            slug(&unit)
        };
        self.root
            .join(slug(&normalize_source_id(source_id)))
            .join(format!("{}.txt", file))
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocumentSource {
    async fn fetch(&self, source_id: &str, unit_id: &str) -> Result<Option<String>> {
        let path = self.path_for(source_id, unit_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "document not found");
                Ok(None)
            }
            Err(e) => Err(NormRefError::Document {
                message: format!("failed to read '{}': {}", path.display(), e),
                source_id: source_id.to_string(),
                unit_id: unit_id.to_string(),
            }),
        }
    }
}

/// File-name-safe form of an id: alphanumerics kept, runs of anything else
/// replaced by a single `-`.
pub fn slug(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut pending_dash = false;
    for c in id.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("règlement (ce) n° 1107/2009"), "règlement-ce-n-1107-2009");
        assert_eq!(slug("article l253-5"), "article-l253-5");
        assert_eq!(slug("  "), "");
    }

    #[tokio::test]
    async fn test_in_memory_keys_are_normalised() {
        let docs = InMemoryDocumentSource::new().with(
            "Code rural et de la pêche maritime",
            "article L. 253-5",
            "texte",
        );
        let found = docs
            .fetch("code rural et de la pêche maritime", "article L253-5")
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("texte"));
        assert!(docs.fetch("code civil", "article 1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let docs = DirectoryDocumentSource::new(dir.path());
        let path = docs.path_for("directive 2009/128/CE", "");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Article 1\nObjet.").unwrap();

        assert!(path.ends_with("directive-2009-128-ce/_full.txt"));
        let found = docs.fetch("directive 2009/128/CE", "").await.unwrap();
        assert_eq!(found.as_deref(), Some("Article 1\nObjet."));
        assert!(docs.fetch("directive 2009/128/CE", "article 2").await.unwrap().is_none());
    }
}
