//! Content retrieval: turns a linked reference into the text it points to.
//!
//! Addresses are parsed from the citation, the enclosing unit is fetched or
//! taken from the article context, the cited subdivision is carved out of it
//! and the answer to the reference's resolution question is extracted.

/// Citation to address parsing.
pub mod address;

/// Document source abstraction and its in-memory and directory implementations.
pub mod documents;

/// Hierarchy-aware carving of legal text.
pub mod hierarchy;

/// Retrieval strategies and answer extraction.
pub mod strategy;

use serde::{Deserialize, Serialize};

use crate::types::{ArticleContext, SourceTag};

pub use address::{parse_address, ReferenceAddress};
pub use documents::{DirectoryDocumentSource, DocumentSource, InMemoryDocumentSource};
pub use hierarchy::{carve, Carved, Marker};
pub use strategy::{ContentRetrievalStrategy, RetrievalFailure, Retrieved};

/// The unit a citation is read relative to.
///
/// For references found in an amendment fragment this is the amended
/// article; for sub-references it is the unit their parent resolved into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalScope {
    pub article_id: String,
    pub source_id: Option<String>,
    pub text: String,
}

impl RetrievalScope {
    /// Scope of the amended article, in the state selected by `tag`.
    pub fn for_article(context: &ArticleContext, tag: SourceTag) -> Self {
        Self {
            article_id: context.article_id.clone(),
            source_id: context.code_id.clone(),
            text: context.text_for(tag).to_string(),
        }
    }
}
