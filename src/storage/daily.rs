use chrono::Local;

use super::kv::{read_json, write_json};
use super::schema::LocalStore;
use super::types::{DailyCounter, StoreError};
use super::DAILY_LIMIT_KEY;

/// Device-local calendar date as `YYYY-MM-DD`.
pub(crate) fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

impl LocalStore {
    // ========================================================================
    // Daily Download Counter Operations
    // ========================================================================

    /// Articles downloaded today for `source_id`.
    ///
    /// A record from an earlier day counts as zero. It is not reset here; the
    /// next increment replaces it.
    pub async fn get_daily_download_count(&self, source_id: &str) -> u32 {
        match read_json::<_, DailyCounter>(&self.pool, DAILY_LIMIT_KEY).await {
            Ok(Some(record)) if record.date == today() => record.count_for(source_id),
            Ok(_) => 0,
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "Failed to read daily download count");
                0
            }
        }
    }

    /// Add one download for `source_id` today and return the new count.
    ///
    /// A record dated any other day is dropped in favour of a fresh record for
    /// today, so counts never carry over. Returns 0 if the store fails.
    pub async fn increment_daily_download_count(&self, source_id: &str) -> u32 {
        match self.try_increment_daily_download_count(source_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "Failed to increment daily download count");
                0
            }
        }
    }

    async fn try_increment_daily_download_count(&self, source_id: &str) -> Result<u32, StoreError> {
        let today = today();
        let mut tx = self.pool.begin().await?;

        let stored = match read_json::<_, DailyCounter>(&mut *tx, DAILY_LIMIT_KEY).await {
            Ok(stored) => stored,
            Err(StoreError::Serialize(e)) => {
                tracing::warn!(error = %e, "Daily counter is corrupt, starting a new one");
                None
            }
            Err(e) => return Err(e),
        };

        let mut record = match stored {
            Some(record) if record.date == today => record,
            _ => DailyCounter::fresh(today),
        };

        let counts = record.counts.get_or_insert_with(Default::default);
        let count = counts.entry(source_id.to_string()).or_insert(0);
        *count += 1;
        let count = *count;

        write_json(&mut *tx, DAILY_LIMIT_KEY, &record).await?;
        tx.commit().await?;
        Ok(count)
    }
}
