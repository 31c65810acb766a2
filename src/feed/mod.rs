//! Feed acquisition and normalization.
//!
//! - **Normalizers**: [`normalize_xml`] for RSS 2.0 / Atom documents and
//!   [`normalize_json`] for WordPress REST post collections, both producing
//!   canonical [`Article`](crate::storage::Article)s
//! - **Fetching**: [`Fetcher`] walks a source's candidate endpoints, writes
//!   successful results through to the feed cache and falls back to the cache
//!   when the network is unavailable or every endpoint fails
//!
//! The two normalizers deliberately disagree on `content`: XML items carry
//! plain text, WordPress posts carry the rendered HTML.

mod fetcher;
mod wordpress;
mod xml;

use thiserror::Error;

pub use fetcher::{build_client, Fallback, FetchError, FetchOutcome, Fetcher, Origin};
pub use wordpress::normalize_json;
pub use xml::normalize_xml;

/// A payload that could not be turned into articles.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed or unbalanced XML
    #[error("invalid XML: {0}")]
    Xml(String),
    /// Payload is not a WordPress post collection
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
