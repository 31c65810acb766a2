//! Local persistence for saved articles, the per-source feed cache and the
//! daily download counters.
//!
//! Everything lives in one SQLite-backed key-value table. Each surface owns a
//! fixed key and stores a JSON document under it:
//!
//! - [`SAVED_ARTICLES_KEY`] - newest-first list of [`SavedArticle`]
//! - [`FEED_CACHE_KEY`] - map of source id to its last good [`Article`] list
//! - [`DAILY_LIMIT_KEY`] - today's [`DailyCounter`]
//!
//! Data operations never return errors. Read failures come back as empty
//! lists or zero counts and write failures as `false`, after being logged.

mod daily;
mod feed_cache;
mod kv;
mod saved;
mod schema;
mod types;

pub use schema::LocalStore;
pub use types::{Article, DailyCounter, SavedArticle, StoreError};

pub const SAVED_ARTICLES_KEY: &str = "@saved_articles";
pub const FEED_CACHE_KEY: &str = "@feed_cache";
pub const DAILY_LIMIT_KEY: &str = "@daily_download_limit";

/// Counter name that reads the legacy single-total daily record.
pub const TOTAL_COUNTER: &str = "total";
