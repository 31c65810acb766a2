use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-level errors.
///
/// Only [`LocalStore::open`](super::LocalStore::open) surfaces these to callers.
/// Data operations log them and degrade to a safe default instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Migration failed
    #[error("Store migration failed: {0}")]
    Migration(String),

    /// Stored value could not be encoded or decoded
    #[error("Stored value is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Article Types
// ============================================================================

/// Canonical article produced by the feed normalizers.
///
/// `id` is only unique within a source. Two articles with the same id are the
/// same logical article as far as the saved-articles list is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(deserialize_with = "deserialize_article_id")]
    pub id: String,
    pub headline: String,
    /// Cleaned excerpt. Only the WordPress path fills this in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Plain text for XML sources, rendered HTML for WordPress sources.
    #[serde(default)]
    pub content: String,
    /// Date string exactly as the source supplied it.
    #[serde(default)]
    pub date: Option<String>,
    /// Display name of the source, not its id.
    pub source: String,
    pub image_url: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

/// An article in the saved-articles list.
///
/// `downloaded_at` is stamped once when the article is first saved and never
/// rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub downloaded_at: DateTime<Utc>,
}

impl std::ops::Deref for SavedArticle {
    type Target = Article;

    fn deref(&self) -> &Article {
        &self.article
    }
}

/// Accepts the id shapes older builds wrote: a plain string, a bare number, or
/// an XML-parser text wrapper such as `{"#text": "guid-1"}`.
fn deserialize_article_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
        Wrapped {
            #[serde(rename = "#text")]
            text: serde_json::Value,
        },
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(s) => Ok(s),
        RawId::Number(n) => Ok(n.to_string()),
        RawId::Wrapped { text } => match text {
            serde_json::Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        },
    }
}

// ============================================================================
// Daily Counter Record
// ============================================================================

/// Per-day download counter as stored under the daily-limit key.
///
/// `count` is the legacy single total from before per-source counting; it is
/// only consulted when `counts` is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<BTreeMap<String, u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl DailyCounter {
    pub fn fresh(date: String) -> Self {
        Self {
            date,
            counts: Some(BTreeMap::new()),
            count: None,
        }
    }

    /// Count recorded for `source_id`, ignoring the stored date.
    pub fn count_for(&self, source_id: &str) -> u32 {
        match &self.counts {
            Some(counts) => counts.get(source_id).copied().unwrap_or(0),
            None if source_id == super::TOTAL_COUNTER => self.count.unwrap_or(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn article_json(id: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "headline": "Headline",
            "content": "Body",
            "date": "Tue, 01 Oct 2024 10:00:00 +0800",
            "source": "The Borneo Post",
            "imageUrl": "https://example.com/a.jpg",
            "url": "https://example.com/a",
            "verified": false
        })
    }

    #[test]
    fn test_id_plain_string() {
        let a: Article = serde_json::from_value(article_json("abc".into())).unwrap();
        assert_eq!(a.id, "abc");
    }

    #[test]
    fn test_id_number_is_stringified() {
        let a: Article = serde_json::from_value(article_json(12345.into())).unwrap();
        assert_eq!(a.id, "12345");
    }

    #[test]
    fn test_id_text_wrapper_is_unwrapped() {
        let wrapped = serde_json::json!({"#text": "https://x/?p=1", "@_isPermaLink": "false"});
        let a: Article = serde_json::from_value(article_json(wrapped)).unwrap();
        assert_eq!(a.id, "https://x/?p=1");
    }

    #[test]
    fn test_article_serializes_camel_case() {
        let a: Article = serde_json::from_value(article_json("1".into())).unwrap();
        let v = serde_json::to_value(&a).unwrap();
        assert!(v.get("imageUrl").is_some());
        assert!(v.get("description").is_none());
    }

    #[test]
    fn test_saved_article_flattens_article_fields() {
        let mut raw = article_json("7".into());
        raw["downloadedAt"] = "2024-10-01T02:00:00Z".into();
        let saved: SavedArticle = serde_json::from_value(raw).unwrap();
        assert_eq!(saved.id, "7");
        assert_eq!(saved.downloaded_at.to_rfc3339(), "2024-10-01T02:00:00+00:00");

        let back = serde_json::to_value(&saved).unwrap();
        assert_eq!(back["headline"], "Headline");
        assert!(back.get("downloadedAt").is_some());
    }

    #[test]
    fn test_daily_counter_legacy_total() {
        let legacy: DailyCounter =
            serde_json::from_str(r#"{"date":"2024-10-01","count":4}"#).unwrap();
        assert_eq!(legacy.count_for("total"), 4);
        assert_eq!(legacy.count_for("borneo"), 0);
    }

    #[test]
    fn test_daily_counter_prefers_per_source_counts() {
        let both: DailyCounter =
            serde_json::from_str(r#"{"date":"2024-10-01","count":9,"counts":{"borneo":2}}"#)
                .unwrap();
        assert_eq!(both.count_for("borneo"), 2);
        assert_eq!(both.count_for("total"), 0);
    }
}
