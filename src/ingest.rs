use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::OptionalExtension;
use serde::Serialize;
use threadpool::ThreadPool;

use crate::error::{Error, Result};
use crate::feed::{Feed, FeedCollection, FeedItem};
use crate::library::{Library, Upsert};
use crate::query;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

pub type ProgressFn = Arc<dyn Fn(IngestProgress) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Collections,
    Items,
    Memberships,
    SearchIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestProgress {
    pub stage: IngestStage,
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub progress_every: usize,
    pub progress: Option<ProgressFn>,
}

impl Default for IngestOptions {
    fn default() -> IngestOptions {
        IngestOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
            progress: None,
        }
    }
}

/// One record that could not be taken over. Ingestion continues without it.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("record {record}: {reason}")]
pub struct IngestionError {
    pub record: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub legacy: bool,
    pub items_inserted: usize,
    pub items_updated: usize,
    pub collections_inserted: usize,
    pub collections_updated: usize,
    pub placeholders: usize,
    pub memberships: usize,
    pub indexed: usize,
    pub failures: Vec<IngestionError>,
    pub elapsed: Duration,
}

impl IngestReport {
    pub fn items(&self) -> usize {
        self.items_inserted + self.items_updated
    }
}

/// Posts progress to the callback on a single side thread. Delivery is
/// advisory; nothing waits for it.
struct Progress {
    callback: Option<ProgressFn>,
    pool: Option<ThreadPool>,
    every: usize,
    started: Instant,
}

impl Progress {
    fn new(options: &IngestOptions) -> Progress {
        let pool = options
            .progress
            .as_ref()
            .map(|_| ThreadPool::with_name("musicdex-progress".to_string(), 1));

        Progress {
            callback: options.progress.clone(),
            pool,
            every: options.progress_every.max(1),
            started: Instant::now(),
        }
    }

    fn tick(&self, stage: IngestStage, processed: usize, total: usize) {
        if processed % self.every == 0 {
            self.post(stage, processed, total);
        }
    }

    fn post(&self, stage: IngestStage, processed: usize, total: usize) {
        if let (Some(callback), Some(pool)) = (&self.callback, &self.pool) {
            let callback = callback.clone();
            let progress = IngestProgress {
                stage,
                processed,
                total,
                elapsed: self.started.elapsed(),
            };

            pool.execute(move || callback(progress));
        }
    }
}

fn failure(report: &mut IngestReport, record: String, reason: String) {
    warn!("skipping {}: {}", record, reason);
    report.failures.push(IngestionError { record, reason });
}

fn record_name(value: &serde_json::Value, index: usize) -> String {
    ["persistent_id", "external_id", "id", "name"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .next()
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("#{}", index))
}

/// Takes the whole feed over in one transaction. Malformed records end up
/// in `IngestReport::failures`; any store error rolls back and returns.
pub fn populate(library: &Library, feed: Feed, options: &IngestOptions) -> Result<IngestReport> {
    let started = Instant::now();
    let progress = Progress::new(options);
    let parts = feed.into_parts();

    info!(
        "ingesting {} items, {} collections{}",
        parts.items.len(),
        parts.collections.len(),
        if parts.legacy { " (legacy feed)" } else { "" }
    );

    if let Some(expected) = parts.stats.item_count {
        if expected != parts.items.len() as i64 {
            warn!(
                "feed reports {} items but carries {}",
                expected,
                parts.items.len()
            );
        }
    }

    let mut report = IngestReport {
        legacy: parts.legacy,
        ..Default::default()
    };

    let tx = library.connection().unchecked_transaction()?;

    // Collections
    debug!("stage collections");

    let mut by_name: HashMap<String, i64> = HashMap::new();
    let mut defined: Vec<i64> = Vec::new();
    let total = parts.collections.len();

    for (index, value) in parts.collections.iter().enumerate() {
        let result = FeedCollection::from_value(value)
            .and_then(|c| library.upsert_collection(&c.to_new_collection()).map(|u| (c, u)));

        match result {
            Ok((collection, upsert)) => {
                match upsert {
                    Upsert::Inserted(_) => report.collections_inserted += 1,
                    Upsert::Updated(_) => report.collections_updated += 1,
                }
                by_name
                    .entry(collection.name.trim().to_string())
                    .or_insert_with(|| upsert.id());
                if !defined.contains(&upsert.id()) {
                    defined.push(upsert.id());
                }
            }
            Err(e) if e.is_record_error() => {
                failure(&mut report, record_name(value, index), e.to_string())
            }
            Err(e) => return Err(e),
        }

        progress.tick(IngestStage::Collections, index + 1, total);
    }

    progress.post(IngestStage::Collections, total, total);

    // Items
    debug!("stage items");

    let total = parts.items.len();
    let batch_size = options.batch_size.max(1);
    let mut memberships: Vec<(i64, Vec<String>)> = Vec::with_capacity(total);

    for (batch_index, batch) in parts.items.chunks(batch_size).enumerate() {
        trace!("item batch {} ({} records)", batch_index, batch.len());

        for (offset, value) in batch.iter().enumerate() {
            let index = batch_index * batch_size + offset;

            let result = FeedItem::from_value(value)
                .and_then(|item| library.insert_item(&item.to_new_item()).map(|u| (item, u)));

            match result {
                Ok((item, upsert)) => {
                    if upsert.is_inserted() {
                        report.items_inserted += 1;
                    } else {
                        report.items_updated += 1;
                    }
                    memberships.push((upsert.id(), item.collections));
                }
                Err(e) if e.is_record_error() => {
                    failure(&mut report, record_name(value, index), e.to_string())
                }
                Err(e) => return Err(e),
            }

            progress.tick(IngestStage::Items, index + 1, total);
        }
    }

    progress.post(IngestStage::Items, total, total);

    // Memberships, in feed order per collection
    debug!("stage memberships");

    let mut members: HashMap<i64, Vec<i64>> = defined.iter().map(|&id| (id, Vec::new())).collect();
    let mut touched: Vec<i64> = defined.clone();
    let mut placeholders: Vec<i64> = Vec::new();
    let total = memberships.len();

    for (index, (item_id, names)) in memberships.iter().enumerate() {
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let collection_id = match by_name.get(name) {
                Some(&id) => id,
                None => {
                    let id = match library.collection_id_by_name(name)? {
                        Some(id) => id,
                        None => {
                            debug!("placeholder collection '{}'", name);
                            let id = library.get_or_create_collection(name)?;
                            placeholders.push(id);
                            id
                        }
                    };
                    by_name.insert(name.to_string(), id);
                    id
                }
            };

            members
                .entry(collection_id)
                .or_insert_with(|| {
                    touched.push(collection_id);
                    Vec::new()
                })
                .push(*item_id);
        }

        progress.tick(IngestStage::Memberships, index + 1, total);
    }

    for collection_id in &touched {
        let item_ids = members.get(collection_id).map(Vec::as_slice).unwrap_or(&[]);
        let count = library.replace_collection_items(*collection_id, item_ids)?;

        if placeholders.contains(collection_id) {
            library.set_collection_track_count(*collection_id, count as i64)?;
        }

        report.memberships += count;
    }

    report.placeholders = placeholders.len();
    progress.post(IngestStage::Memberships, total, total);

    // Search index
    debug!("stage search index");

    report.indexed = library.rebuild_search_index()?;
    progress.post(IngestStage::SearchIndex, report.indexed, report.indexed);

    tx.commit()?;

    report.elapsed = started.elapsed();

    info!(
        "ingested {} items ({} new, {} updated), {} memberships, {} failures in {:.2}s",
        report.items(),
        report.items_inserted,
        report.items_updated,
        report.memberships,
        report.failures.len(),
        report.elapsed.as_secs_f64()
    );

    Ok(report)
}

/// Replaces the membership of one collection with `ordered_ids` (item
/// external ids) in order. Unknown ids are skipped. Returns the number of
/// memberships written.
pub fn sync_collection(
    library: &Library,
    collection_external_id: &str,
    ordered_ids: &[String],
) -> Result<usize> {
    let collection_id = match library.collection_id_by_external_id(collection_external_id)? {
        Some(id) => id,
        None => {
            return Err(Error::NotFound(format!(
                "collection {}",
                collection_external_id
            )))
        }
    };

    let tx = library.connection().unchecked_transaction()?;

    let mut item_ids = Vec::with_capacity(ordered_ids.len());

    for external_id in ordered_ids {
        match library.item_id_by_external_id(external_id)? {
            Some(item_id) => item_ids.push(item_id),
            None => warn!(
                "sync {}: unknown item {}, skipped",
                collection_external_id, external_id
            ),
        }
    }

    let count = library.replace_collection_items(collection_id, &item_ids)?;
    library.set_collection_track_count(collection_id, count as i64)?;

    tx.commit()?;

    debug!(
        "synced collection {} with {} items",
        collection_external_id, count
    );

    Ok(count)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub items: i64,
    pub indexed: i64,
    pub smoke_term: Option<String>,
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<ValidationReport> {
        if self.ok {
            Ok(self)
        } else {
            Err(Error::Validation(self.issues))
        }
    }
}

fn smoke_term(library: &Library) -> Result<Option<String>> {
    let artist: Option<String> = library
        .connection()
        .query_row(
            "SELECT Artist.name FROM Item
            INNER JOIN Artist ON Artist.artist_id = Item.artist_id
            GROUP BY Item.artist_id
            ORDER BY COUNT(*) DESC, Artist.name
            LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(artist.and_then(|name| {
        name.split_whitespace()
            .find(|word| word.chars().any(char::is_alphanumeric))
            .map(|word| word.to_string())
    }))
}

/// Post-ingestion health check of the store and its search index.
pub fn validate(library: &Library) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        items: library.item_count()?,
        ..Default::default()
    };

    if report.items == 0 {
        report.issues.push("library has no items".to_string());
    }

    match library.search_index_count() {
        Ok(indexed) => {
            report.indexed = indexed;
            if indexed != report.items {
                report.issues.push(format!(
                    "search index has {} rows for {} items",
                    indexed, report.items
                ));
            }
        }
        Err(e) => report.issues.push(format!("search index unreadable: {}", e)),
    }

    report.smoke_term = smoke_term(library)?;

    if let Some(expression) = report.smoke_term.as_deref().and_then(query::match_expression) {
        let hits: rusqlite::Result<i64> = library.connection().query_row(
            "SELECT COUNT(*) FROM ItemSearch WHERE ItemSearch MATCH ?",
            [&expression],
            |row| row.get(0),
        );

        match hits {
            Ok(0) => report
                .issues
                .push(format!("search for {} found nothing", expression)),
            Ok(_) => (),
            Err(e) => report
                .issues
                .push(format!("search for {} failed: {}", expression, e)),
        }
    }

    report.ok = report.issues.is_empty();

    if report.ok {
        info!("validation passed ({} items)", report.items);
    } else {
        warn!("validation found {} issues", report.issues.len());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::CollectionRef;
    use crate::query::SearchFilters;
    use crate::test_support::open_library;
    use std::sync::mpsc;
    use std::sync::Mutex;

    const ENHANCED: &str = r#"{
        "status": "success",
        "tracks": [
            {"persistent_id": "T1", "name": "So What", "artist": "Miles Davis",
             "album": "Kind of Blue", "genre": "Jazz", "rating": 100,
             "playlists": ["Evening"]},
            {"persistent_id": "T2", "name": "Naima", "artist": "John Coltrane",
             "album": "Giant Steps", "genre": "Jazz", "loved": true,
             "playlists": ["Evening", "Loved"]},
            {"persistent_id": "T3", "name": "Paranoid", "artist": "Black Sabbath",
             "album": "Paranoid", "genre": "Metal"}
        ],
        "playlists": [
            {"persistent_id": "P1", "name": "Evening", "special_kind": "none", "track_count": 2}
        ],
        "stats": {"track_count": 3, "playlist_count": 1}
    }"#;

    fn ids(items: &[crate::library::Item]) -> Vec<String> {
        items.iter().map(|i| i.external_id.clone()).collect()
    }

    #[test]
    fn reingest_updates_in_place() {
        let (_dir, _source, library) = open_library();
        let options = IngestOptions::default();

        let first = populate(&library, Feed::from_json(ENHANCED).unwrap(), &options).unwrap();
        assert_eq!(first.items_inserted, 3);
        assert_eq!(first.collections_inserted, 1);
        assert_eq!(first.placeholders, 1);
        assert_eq!(first.memberships, 3);
        assert!(first.failures.is_empty());

        let second = populate(&library, Feed::from_json(ENHANCED).unwrap(), &options).unwrap();
        assert_eq!(second.items_inserted, 0);
        assert_eq!(second.items_updated, 3);
        assert_eq!(second.collections_updated, 1);
        assert_eq!(second.placeholders, 0);

        assert_eq!(library.item_count().unwrap(), 3);
        assert_eq!(library.search_index_count().unwrap(), 3);
        assert_eq!(library.collections().unwrap().len(), 2);

        let evening = library
            .collection_items(&CollectionRef::ExternalId("P1".to_string()))
            .unwrap();
        assert_eq!(ids(&evening), vec!["T1", "T2"]);

        let loved = library
            .collection_items(&CollectionRef::Name("Loved".to_string()))
            .unwrap();
        assert_eq!(ids(&loved), vec!["T2"]);
    }

    #[test]
    fn sync_round_trips_order() {
        let (_dir, _source, library) = open_library();
        populate(&library, Feed::from_json(ENHANCED).unwrap(), &IngestOptions::default()).unwrap();

        let order: Vec<String> = vec!["T3", "T1", "missing", "T2", "T1"]
            .into_iter()
            .map(String::from)
            .collect();

        assert_eq!(sync_collection(&library, "P1", &order).unwrap(), 3);

        let items = library
            .collection_items(&CollectionRef::ExternalId("P1".to_string()))
            .unwrap();
        assert_eq!(ids(&items), vec!["T3", "T1", "T2"]);

        let evening = library
            .collections()
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Evening")
            .unwrap();
        assert_eq!(evening.track_count, 3);

        assert!(sync_collection(&library, "P404", &order)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn legacy_feed_synthesizes_collections() {
        let (_dir, _source, library) = open_library();

        let feed = Feed::from_json(
            r#"[
                {"persistent_id": "L1", "name": "First", "artist": "Someone",
                 "playlists": ["Favorites"]},
                {"persistent_id": "L2", "name": "Second", "artist": "Someone",
                 "playlists": ["Favorites"]},
                {"persistent_id": "L3", "name": "Third", "artist": "Other"}
            ]"#,
        )
        .unwrap();

        let report = populate(&library, feed, &IngestOptions::default()).unwrap();
        assert!(report.legacy);
        assert_eq!(report.collections_inserted, 1);

        let favorites = library
            .collections()
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Favorites")
            .unwrap();
        assert_eq!(favorites.track_count, 2);
        assert_eq!(favorites.external_id, None);

        let items = library
            .collection_items(&CollectionRef::Name("Favorites".to_string()))
            .unwrap();
        assert_eq!(ids(&items), vec!["L1", "L2"]);
    }

    #[test]
    fn malformed_records_are_skipped() {
        let (_dir, _source, library) = open_library();

        let feed = Feed::from_json(
            r#"[
                {"persistent_id": "G1", "name": "Good"},
                {"name": "No id"},
                {"persistent_id": "G2", "name": "  "},
                {"persistent_id": "G3", "name": "Also good", "last_played": "never"}
            ]"#,
        )
        .unwrap();

        let report = populate(&library, feed, &IngestOptions::default()).unwrap();
        assert_eq!(report.items_inserted, 1);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(report.failures[0].record, "No id");
        assert_eq!(report.failures[1].record, "G2");
        assert_eq!(library.item_count().unwrap(), 1);
    }

    #[test]
    fn progress_is_reported_per_stage() {
        let (_dir, _source, library) = open_library();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        let options = IngestOptions {
            batch_size: 2,
            progress_every: 1,
            progress: Some(Arc::new(move |p: IngestProgress| {
                if let Ok(tx) = tx.lock() {
                    let _ = tx.send(p);
                }
            })),
        };

        populate(&library, Feed::from_json(ENHANCED).unwrap(), &options).unwrap();

        let mut seen = Vec::new();
        while let Ok(progress) = rx.recv_timeout(Duration::from_secs(5)) {
            let done = progress.stage == IngestStage::SearchIndex;
            seen.push(progress);
            if done {
                break;
            }
        }

        assert!(seen
            .iter()
            .any(|p| p.stage == IngestStage::Items && p.processed == 3 && p.total == 3));
        assert_eq!(seen.last().map(|p| p.stage), Some(IngestStage::SearchIndex));
    }

    #[test]
    fn failed_ingestion_rolls_back() {
        let (_dir, _source, library) = open_library();
        populate(&library, Feed::from_json(ENHANCED).unwrap(), &IngestOptions::default()).unwrap();

        library
            .connection()
            .execute_batch(
                "DROP TRIGGER Item_search_delete;
                DROP TRIGGER Item_search_update;
                DROP TRIGGER Item_search_insert;
                DROP TABLE ItemSearch;",
            )
            .unwrap();

        let feed = Feed::from_json(r#"[{"persistent_id": "N1", "name": "New", "playlists": ["Fresh"]}]"#)
            .unwrap();

        assert!(populate(&library, feed, &IngestOptions::default()).is_err());

        assert_eq!(library.item_count().unwrap(), 3);
        assert_eq!(library.item_by_external_id("N1").unwrap(), None);
        assert_eq!(library.collection_id_by_name("Fresh").unwrap(), None);
    }

    fn bulk_items(prefix: &str, count: usize, name_len: usize) -> Vec<FeedItem> {
        (0..count)
            .map(|i| FeedItem {
                external_id: format!("{}{}", prefix, i),
                name: format!("Track {} {}", i, "x".repeat(name_len)),
                artist: Some("Bulk".to_string()),
                collections: vec!["Bulk".to_string()],
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn full_store_rolls_back_everything() {
        let (_dir, _source, library) = open_library();

        let page_count: i64 = library
            .connection()
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap();
        library
            .connection()
            .execute_batch(&format!("PRAGMA max_page_count = {};", page_count + 4))
            .unwrap();

        let feed = Feed::from_items(&bulk_items("F", 400, 200)).unwrap();
        let result = populate(&library, feed, &IngestOptions::default());

        assert!(matches!(result, Err(Error::Store(_))), "{:?}", result);
        assert_eq!(library.item_count().unwrap(), 0);
        assert_eq!(library.collection_id_by_name("Bulk").unwrap(), None);
    }

    #[test]
    fn store_error_mid_batch_rolls_back() {
        let (_dir, _source, library) = open_library();
        populate(&library, Feed::from_json(ENHANCED).unwrap(), &IngestOptions::default()).unwrap();

        library
            .connection()
            .execute_batch(
                "CREATE TRIGGER Item_reject BEFORE INSERT ON Item
                WHEN NEW.external_id = 'B3'
                BEGIN
                    SELECT RAISE(ABORT, 'rejected');
                END;",
            )
            .unwrap();

        let options = IngestOptions {
            batch_size: 2,
            ..Default::default()
        };
        let feed = Feed::from_items(&bulk_items("B", 6, 4)).unwrap();

        assert!(matches!(
            populate(&library, feed, &options),
            Err(Error::Store(_))
        ));

        assert_eq!(library.item_count().unwrap(), 3);
        assert_eq!(library.search_index_count().unwrap(), 3);
        assert_eq!(library.item_by_external_id("B1").unwrap(), None);
        assert_eq!(library.collection_id_by_name("Bulk").unwrap(), None);
    }

    #[test]
    fn validation_checks_index_and_smoke_search() {
        let (_dir, _source, library) = open_library();

        let empty = validate(&library).unwrap();
        assert!(!empty.ok);
        assert!(matches!(empty.into_result(), Err(Error::Validation(_))));

        populate(&library, Feed::from_json(ENHANCED).unwrap(), &IngestOptions::default()).unwrap();

        let report = validate(&library).unwrap();
        assert!(report.ok, "{:?}", report.issues);
        assert_eq!(report.indexed, 3);
        assert!(report.smoke_term.is_some());

        library
            .connection()
            .execute("DELETE FROM ItemSearch WHERE rowid = (SELECT MIN(item_id) FROM Item)", [])
            .unwrap();

        let report = validate(&library).unwrap();
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn ingested_items_are_searchable() {
        let (_dir, _source, library) = open_library();
        populate(&library, Feed::from_json(ENHANCED).unwrap(), &IngestOptions::default()).unwrap();

        let outcome = library.search("naima", &SearchFilters::default()).unwrap();
        assert_eq!(ids(&outcome.items), vec!["T2"]);
        assert!(outcome.items[0].starred);
    }
}
