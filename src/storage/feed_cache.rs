use std::collections::BTreeMap;

use super::kv::{read_json, write_json};
use super::schema::LocalStore;
use super::types::{Article, StoreError};
use super::FEED_CACHE_KEY;

/// Last good article list per source id.
type FeedCacheMap = BTreeMap<String, Vec<Article>>;

impl LocalStore {
    // ========================================================================
    // Feed Cache Operations
    // ========================================================================

    /// Replace the cached list for `source_id` with `articles`.
    ///
    /// The previous list for that source is discarded, not merged. Other
    /// sources' entries are left alone.
    pub async fn save_feed_cache(&self, articles: &[Article], source_id: &str) -> bool {
        match self.try_save_feed_cache(articles, source_id).await {
            Ok(()) => {
                tracing::debug!(source = %source_id, count = articles.len(), "Feed cache updated");
                true
            }
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "Failed to save feed cache");
                false
            }
        }
    }

    async fn try_save_feed_cache(&self, articles: &[Article], source_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut cache = match read_json::<_, FeedCacheMap>(&mut *tx, FEED_CACHE_KEY).await {
            Ok(cache) => cache.unwrap_or_default(),
            Err(StoreError::Serialize(e)) => {
                tracing::warn!(error = %e, "Feed cache is corrupt, starting a new one");
                FeedCacheMap::new()
            }
            Err(e) => return Err(e),
        };
        cache.insert(source_id.to_string(), articles.to_vec());

        write_json(&mut *tx, FEED_CACHE_KEY, &cache).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cached articles for `source_id`, or an empty list.
    ///
    /// Ids stored in older wrapped shapes come back as plain strings.
    pub async fn get_feed_cache(&self, source_id: &str) -> Vec<Article> {
        match read_json::<_, FeedCacheMap>(&self.pool, FEED_CACHE_KEY).await {
            Ok(Some(mut cache)) => cache.remove(source_id).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "Failed to read feed cache");
                Vec::new()
            }
        }
    }
}
