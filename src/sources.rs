//! Catalog of known news sources.
//!
//! Lookups never fail: an unknown id resolves to the registry's default
//! source so one bad setting cannot take the whole feed down.

use serde::Deserialize;
use url::Url;

/// Payload format served by a source's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// RSS 2.0 or Atom document
    Xml,
    /// WordPress REST collection of posts
    Json,
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub name: String,
    /// Candidate endpoints, most preferred first.
    pub urls: Vec<String>,
    pub format: SourceFormat,
    pub verify_cert: bool,
    /// Image used when an article has no usable image of its own.
    pub placeholder_image: String,
}

/// Read-only source table with a designated default entry.
#[derive(Debug, Clone)]
pub struct Registry {
    sources: Vec<Source>,
    default_index: usize,
}

pub const DEFAULT_SOURCE_ID: &str = "borneo";

impl Registry {
    /// Build a registry from `sources`. `default_id` must name one of them;
    /// otherwise the first entry becomes the default.
    ///
    /// # Panics
    ///
    /// Panics if `sources` is empty.
    pub fn new(sources: Vec<Source>, default_id: &str) -> Self {
        assert!(!sources.is_empty(), "registry needs at least one source");
        let default_index = sources
            .iter()
            .position(|s| s.id == default_id)
            .unwrap_or(0);
        Self {
            sources,
            default_index,
        }
    }

    /// The built-in catalog. `per_page` sizes the WordPress endpoints.
    pub fn builtin(per_page: u32) -> Self {
        let sources = vec![
            Source {
                id: "borneo".to_string(),
                name: "The Borneo Post".to_string(),
                urls: vec![
                    "https://www.theborneopost.com/news/sarawak/feed/".to_string(),
                    "https://www.theborneopost.com/feed/".to_string(),
                ],
                format: SourceFormat::Xml,
                verify_cert: true,
                placeholder_image:
                    "https://www.theborneopost.com/wp-content/uploads/2014/09/theborneopost.jpg"
                        .to_string(),
            },
            wordpress_source(
                "suara",
                "Suara Sarawak",
                "https://suarasarawak.my/",
                per_page,
                "https://suarasarawak.my/wp-content/uploads/2021/04/Logo-Suara-Sarawak-baru.png",
            ),
            wordpress_source(
                "dayak",
                "Dayak Daily",
                "https://dayakdaily.com/",
                per_page,
                "https://dayakdaily.com/wp-content/uploads/2019/08/dayakdaily-logo-web.png",
            ),
        ];
        Self::new(sources, DEFAULT_SOURCE_ID)
    }

    /// Add `source`, replacing any entry with the same id in place.
    pub fn upsert(&mut self, source: Source) {
        match self.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    /// Exact lookup without the default fallback.
    pub fn get(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Look up `id`, falling back to the default source.
    pub fn resolve(&self, id: &str) -> &Source {
        self.get(id).unwrap_or_else(|| {
            let fallback = self.default_source();
            tracing::warn!(requested = %id, fallback = %fallback.id, "Unknown source, using default");
            fallback
        })
    }

    pub fn default_source(&self) -> &Source {
        &self.sources[self.default_index]
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin(DEFAULT_PER_PAGE)
    }
}

pub const DEFAULT_PER_PAGE: u32 = 20;

/// WordPress REST collection endpoint for `base`, with embedded relations
/// so featured media comes back inline.
///
/// Falls back to plain string concatenation if `base` is not a valid URL;
/// the fetch will then fail like any other bad endpoint.
pub fn wordpress_posts_url(base: &str, per_page: u32) -> String {
    match Url::parse(base).and_then(|b| b.join("wp-json/wp/v2/posts")) {
        Ok(mut url) => {
            url.set_query(Some(&format!("_embed&per_page={per_page}")));
            url.to_string()
        }
        Err(_) => format!(
            "{}/wp-json/wp/v2/posts?_embed&per_page={per_page}",
            base.trim_end_matches('/')
        ),
    }
}

fn wordpress_source(
    id: &str,
    name: &str,
    base: &str,
    per_page: u32,
    placeholder_image: &str,
) -> Source {
    Source {
        id: id.to_string(),
        name: name.to_string(),
        urls: vec![wordpress_posts_url(base, per_page)],
        format: SourceFormat::Json,
        verify_cert: false,
        placeholder_image: placeholder_image.to_string(),
    }
}
