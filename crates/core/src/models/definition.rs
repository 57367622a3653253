//! Parsed indexer definition model
//!
//! A definition is the structured recipe for one indexer, refreshed
//! periodically from the upstream definition source. Parsing raw documents
//! into this model lives in the indexers crate; the model itself is shared
//! so the health store can persist capability metadata.

use crate::models::torrent::MediaType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Indexer visibility as declared upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// How a search path's response body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Html,
    Json,
    Rss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// One templated search endpoint of an indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPath {
    /// Path template with placeholders resolved at dispatch time.
    pub path: String,
    pub method: HttpMethod,
    pub kind: ResponseKind,
}

/// Extraction recipe for one field of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// CSS selector (HTML), dotted path (JSON), or element name (RSS).
    pub selector: String,
    /// Attribute to read instead of text content, e.g. `href`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// Row + per-field selectors for HTML/JSON/RSS extraction.
///
/// Treated as opaque data by everything except the generic template driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Selector matching one result row.
    #[serde(default)]
    pub rows: String,
    /// Field name -> extraction recipe. Recognized names: title, magnet,
    /// infohash, size, seeders, date, details.
    #[serde(default)]
    pub fields: HashMap<String, FieldSelector>,
}

/// Parsed capability metadata for one indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerDefinition {
    pub id: String,
    pub display_name: String,
    pub language: Option<String>,
    pub visibility: Visibility,
    /// Mirror base URLs, order is preference. Empty means unusable.
    pub links: Vec<String>,
    pub search_paths: Vec<SearchPath>,
    /// Empty set means the indexer is inapplicable to all user-facing
    /// types and must never be selected.
    pub content_types: BTreeSet<MediaType>,
    pub selectors: SelectorSet,
}

impl IndexerDefinition {
    /// A definition is usable only with at least one mirror and one path.
    pub fn is_usable(&self) -> bool {
        !self.links.is_empty() && !self.search_paths.is_empty()
    }

    pub fn supports(&self, media: MediaType) -> bool {
        self.content_types.contains(&media)
    }
}
