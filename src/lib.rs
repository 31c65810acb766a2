//! Offline-first news ingestion.
//!
//! Articles are pulled from RSS/Atom feeds and WordPress REST endpoints,
//! normalized into one [`Article`](storage::Article) shape, cached per source
//! and saved for offline reading under a per-source daily quota.

pub mod app;
pub mod config;
pub mod download;
pub mod feed;
pub mod net;
pub mod notify;
pub mod sources;
pub mod storage;
pub mod util;
