use std::sync::Arc;
use std::thread;
use std::time::Duration;

use musicdex::db_meta;
use musicdex::feed::{Feed, FeedItem};
use musicdex::ingest::{self, IngestOptions};
use musicdex::library::{CollectionRef, Item, Library, LibrarySource};
use musicdex::query::{SearchFilters, SearchMethod};
use musicdex::schema;
use musicdex::search_cache::SearchCache;
use tempfile::TempDir;

const FEED: &str = r#"{
    "status": "success",
    "tracks": [
        {"persistent_id": "BIG", "name": "Blue in Green", "artist": "Miles Davis",
         "album": "Kind of Blue", "genre": "Jazz", "rating": 100, "loved": true,
         "playlists": ["Late Night"]},
        {"persistent_id": "SW", "name": "So What", "artist": "Miles Davis",
         "album": "Kind of Blue", "genre": "Jazz", "rating": 90,
         "playlists": ["Late Night"]},
        {"persistent_id": "GS", "name": "Giant Steps", "artist": "John Coltrane",
         "album": "Giant Steps", "genre": "Jazz", "rating": 80},
        {"persistent_id": "WP", "name": "War Pigs", "artist": "Black Sabbath",
         "album": "Paranoid", "genre": "Metal", "rating": 95,
         "is_streaming": true, "stream_url": "https://radio.invalid/wp"}
    ],
    "playlists": [
        {"persistent_id": "LN", "name": "Late Night", "special_kind": "none", "track_count": 2}
    ],
    "stats": {"track_count": 4, "playlist_count": 1}
}"#;

fn setup() -> (TempDir, LibrarySource, Library) {
    let dir = tempfile::tempdir().unwrap();
    let source = LibrarySource::create(dir.path().join("library.db"), 15).unwrap();
    let library = source.get().unwrap();

    ingest::populate(&library, Feed::from_json(FEED).unwrap(), &IngestOptions::default())
        .unwrap();

    (dir, source, library)
}

fn ids(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.external_id.as_str()).collect()
}

#[test]
fn migrations_are_idempotent_across_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");

    LibrarySource::create(path.clone(), 15).unwrap();
    let source = LibrarySource::create(path, 15).unwrap();

    let library = source.get().unwrap();
    assert_eq!(
        db_meta::current_version(library.connection()).unwrap(),
        schema::latest_version()
    );
}

#[test]
fn miles_davis_scenario() {
    let (_dir, _source, library) = setup();
    let filters = SearchFilters::default();

    let outcome = library.search("Miles Davis", &filters).unwrap();
    assert_eq!(outcome.method, SearchMethod::FullText);
    assert_eq!(ids(&outcome.items), vec!["BIG", "SW"]);

    let album = library.search("Kind of Blue", &filters).unwrap();
    let mut found = ids(&album.items);
    found.sort();
    assert_eq!(found, vec!["BIG", "SW"]);

    assert!(library
        .search("nonexistent", &filters)
        .unwrap()
        .items
        .is_empty());
}

#[test]
fn reingest_with_changes_updates_in_place() {
    let (_dir, _source, library) = setup();

    let changed = FEED
        .replace("\"So What\"", "\"So What (Remastered)\"")
        .replace("\"rating\": 90", "\"rating\": 70");

    let report =
        ingest::populate(&library, Feed::from_json(&changed).unwrap(), &IngestOptions::default())
            .unwrap();

    assert_eq!(report.items_inserted, 0);
    assert_eq!(report.items_updated, 4);
    assert_eq!(library.item_count().unwrap(), 4);
    assert_eq!(library.search_index_count().unwrap(), 4);

    let item = library.item_by_external_id("SW").unwrap().unwrap();
    assert_eq!(item.name, "So What (Remastered)");
    assert_eq!(item.rating, 70);
    assert_eq!(item.collections, vec!["Late Night".to_string()]);

    let found = library.search("remastered", &SearchFilters::default()).unwrap();
    assert_eq!(ids(&found.items), vec!["SW"]);
}

#[test]
fn synced_order_reads_back() {
    let (_dir, _source, library) = setup();

    let order: Vec<String> = vec!["GS".to_string(), "SW".to_string(), "BIG".to_string()];
    ingest::sync_collection(&library, "LN", &order).unwrap();

    let items = library
        .collection_items(&CollectionRef::ExternalId("LN".to_string()))
        .unwrap();
    assert_eq!(ids(&items), vec!["GS", "SW", "BIG"]);
    assert_eq!(library.search_index_count().unwrap(), library.item_count().unwrap());
}

#[test]
fn filters_compose_and_relax_monotonically() {
    let (_dir, _source, library) = setup();

    let both = SearchFilters {
        genre: Some("Jazz".to_string()),
        min_rating: Some(90),
        ..Default::default()
    };
    let genre_only = SearchFilters {
        min_rating: None,
        ..both.clone()
    };
    let none = SearchFilters::default();

    let narrow = library.search("", &both).unwrap().items;
    assert!(narrow
        .iter()
        .all(|i| i.genre_name == "Jazz" && i.rating >= 90));
    assert_eq!(narrow.len(), 2);

    let wider = library.search("", &genre_only).unwrap().items;
    let widest = library.search("", &none).unwrap().items;

    assert!(ids(&narrow).iter().all(|id| ids(&wider).contains(id)));
    assert!(ids(&wider).iter().all(|id| ids(&widest).contains(id)));
    assert_eq!(wider.len(), 3);
    assert_eq!(widest.len(), 4);
}

#[test]
fn cached_search_repeats_identically() {
    let (_dir, _source, library) = setup();
    let cache = SearchCache::new(100, Duration::from_secs(300), 100);
    let filters = SearchFilters::default();

    let first = cache.search_with_cache(&library, "Miles Davis", &filters).unwrap();
    let second = cache.search_with_cache(&library, "Miles Davis", &filters).unwrap();

    assert_eq!(first, second);

    let metrics = cache.metrics();
    assert_eq!(metrics.len(), 2);
    assert!(!metrics[0].cache_hit);
    assert!(metrics[1].cache_hit);
}

#[test]
fn legacy_favorites_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let source = LibrarySource::create(dir.path().join("library.db"), 15).unwrap();
    let library = source.get().unwrap();

    let items: Vec<FeedItem> = ["F1", "F2"]
        .iter()
        .map(|id| FeedItem {
            external_id: id.to_string(),
            name: format!("Track {}", id),
            artist: Some("Someone".to_string()),
            collections: vec!["Favorites".to_string()],
            ..Default::default()
        })
        .collect();

    ingest::populate(&library, Feed::from_items(&items).unwrap(), &IngestOptions::default())
        .unwrap();

    let collections = library.collections().unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].name, "Favorites");
    assert_eq!(collections[0].track_count, 2);

    let report = ingest::validate(&library).unwrap().into_result().unwrap();
    assert_eq!(report.smoke_term.as_deref(), Some("Someone"));
}

#[test]
fn readers_on_separate_connections() {
    let (_dir, source, _library) = setup();
    let source = Arc::new(source);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let source = source.clone();
            thread::spawn(move || {
                let library = source.get().unwrap();
                library
                    .search("Miles", &SearchFilters::default())
                    .unwrap()
                    .items
                    .len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 2);
    }
}

#[test]
fn error_feed_is_rejected_without_writes() {
    let (_dir, _source, library) = setup();

    assert!(Feed::from_json(r#"{"status": "error", "message": "denied"}"#).is_err());
    assert_eq!(library.item_count().unwrap(), 4);
}
