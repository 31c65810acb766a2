//! WordPress REST (`/wp-json/wp/v2/posts?_embed`) normalizer.
//!
//! Content stays as rendered HTML; only the excerpt is reduced to text.

use serde::Deserialize;

use super::ParseError;
use crate::sources::Source;
use crate::storage::Article;
use crate::util::clean_excerpt;

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    title: Rendered,
    #[serde(default)]
    content: Option<Rendered>,
    #[serde(default)]
    excerpt: Option<Rendered>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<Embedded>,
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    /// Entries may be media objects or REST error objects, so keep them loose.
    #[serde(rename = "wp:featuredmedia", default)]
    featured_media: Option<Vec<serde_json::Value>>,
}

impl WpPost {
    fn featured_image(&self) -> Option<&str> {
        self.embedded
            .as_ref()?
            .featured_media
            .as_ref()?
            .first()?
            .get("source_url")?
            .as_str()
            .filter(|url| !url.is_empty())
    }
}

/// Normalize a WordPress posts collection into articles for `source`.
///
/// One article per post. The post id becomes the article id and the first
/// embedded featured image becomes the image, falling back to the source's
/// placeholder logo.
pub fn normalize_json(payload: &[u8], source: &Source) -> Result<Vec<Article>, ParseError> {
    let posts: Vec<WpPost> = serde_json::from_slice(payload)?;

    Ok(posts
        .into_iter()
        .map(|post| {
            let image_url = post
                .featured_image()
                .unwrap_or(source.placeholder_image.as_str())
                .to_string();
            let description = post
                .excerpt
                .as_ref()
                .map(|e| clean_excerpt(&e.rendered))
                .unwrap_or_default();

            Article {
                id: post.id.to_string(),
                headline: post.title.rendered,
                description: Some(description),
                content: post.content.map(|c| c.rendered).unwrap_or_default(),
                date: post.date,
                source: source.name.clone(),
                image_url,
                url: post.link,
                verified: false,
            }
        })
        .collect())
}
