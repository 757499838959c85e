//! Local media-library index: a SQLite store of items, artists, albums,
//! genres and ordered collections, a full-text projection over it, batch
//! ingestion from extractor feeds and a ranked search with an in-process
//! result cache.

#[macro_use]
extern crate log;

pub mod config;
pub mod db_meta;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod library;
pub mod logger;
pub mod query;
pub mod schema;
pub mod search_cache;

#[cfg(test)]
mod test_support;

pub use crate::error::{Error, Result};

pub const MUSICDEX_VERSION: &str = env!("CARGO_PKG_VERSION");
