use chrono::Utc;
use sqlx::{Executor, Sqlite};
use std::collections::HashSet;

use super::kv::{read_json, write_json};
use super::schema::LocalStore;
use super::types::{Article, SavedArticle, StoreError};
use super::SAVED_ARTICLES_KEY;

impl LocalStore {
    // ========================================================================
    // Saved Article Operations
    // ========================================================================

    /// Save `article` for offline reading.
    ///
    /// Returns `false` without touching the list when an article with the same
    /// id is already saved; the existing entry (and its `downloaded_at`) wins.
    /// New entries go to the front so the list stays newest-first.
    pub async fn save_article(&self, article: &Article) -> bool {
        match self.try_save_article(article).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(id = %article.id, error = %e, "Failed to save article");
                false
            }
        }
    }

    async fn try_save_article(&self, article: &Article) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut saved = load_saved(&mut *tx).await?;
        if saved.iter().any(|s| s.id == article.id) {
            tracing::debug!(id = %article.id, "Article already saved");
            return Ok(false);
        }

        saved.insert(
            0,
            SavedArticle {
                article: article.clone(),
                downloaded_at: Utc::now(),
            },
        );
        write_json(&mut *tx, SAVED_ARTICLES_KEY, &saved).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// All saved articles, newest first.
    ///
    /// Never fails: a missing, unreadable or corrupt list reads as empty.
    pub async fn get_saved_articles(&self) -> Vec<SavedArticle> {
        match load_saved(&self.pool).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read saved articles");
                Vec::new()
            }
        }
    }

    /// Whether an article with this id is in the saved list.
    pub async fn is_saved(&self, id: &str) -> bool {
        self.get_saved_articles().await.iter().any(|s| s.id == id)
    }

    /// Remove a single saved article.
    pub async fn remove_article(&self, id: &str) -> bool {
        self.delete_articles(&[id.to_string()]).await
    }

    /// Remove every saved article whose id is in `ids` and rewrite the rest.
    ///
    /// Ids that are not saved are ignored; the call still succeeds.
    pub async fn delete_articles(&self, ids: &[String]) -> bool {
        match self.try_delete_articles(ids).await {
            Ok(removed) => {
                tracing::debug!(removed = removed, "Deleted saved articles");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to delete saved articles");
                false
            }
        }
    }

    async fn try_delete_articles(&self, ids: &[String]) -> Result<usize, StoreError> {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut tx = self.pool.begin().await?;

        let mut saved = load_saved(&mut *tx).await?;
        let before = saved.len();
        saved.retain(|s| !ids.contains(s.id.as_str()));
        write_json(&mut *tx, SAVED_ARTICLES_KEY, &saved).await?;
        tx.commit().await?;

        Ok(before - saved.len())
    }

    /// Drop the whole saved-articles list.
    pub async fn clear_all_articles(&self) -> bool {
        match self.remove_raw(SAVED_ARTICLES_KEY).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to clear saved articles");
                false
            }
        }
    }
}

/// Read the saved list. A corrupt stored value is logged and treated as an
/// empty list; only database errors propagate.
async fn load_saved<'e, E>(executor: E) -> Result<Vec<SavedArticle>, StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    match read_json::<_, Vec<SavedArticle>>(executor, SAVED_ARTICLES_KEY).await {
        Ok(saved) => Ok(saved.unwrap_or_default()),
        Err(StoreError::Serialize(e)) => {
            tracing::warn!(error = %e, "Saved articles list is corrupt, treating as empty");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
