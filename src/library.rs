use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::config::Config;
use crate::db_meta;
use crate::error::{Error, Result};
use crate::query::{self, SearchFilters, SearchOutcome};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown";

/// Column list shared by every item read. `item_from_row` depends on the
/// order; search appends its score as column 17.
pub(crate) const ITEM_SELECT: &str = "SELECT
        Item.item_id,
        Item.external_id,
        Item.name,
        Artist.name,
        Album.name,
        Genre.name,
        Item.collection,
        Item.rating,
        Item.starred,
        Item.ranking,
        Item.duration,
        Item.play_count,
        Item.last_played,
        Item.created,
        Item.is_streaming,
        Item.kind,
        Item.stream_url";

pub(crate) const ITEM_FROM: &str = "FROM Item
    INNER JOIN Artist ON Artist.artist_id = Item.artist_id
    INNER JOIN Album ON Album.album_id = Item.album_id
    INNER JOIN Genre ON Genre.genre_id = Item.genre_id";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artist {
    pub artist_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Genre {
    pub genre_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Album {
    pub album_id: i64,
    pub name: String,
    pub artist_id: i64,
    pub genre_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub item_id: i64,
    pub external_id: String,
    pub name: String,
    pub artist_name: String,
    pub album_name: String,
    pub genre_name: String,
    pub collection: Option<String>,
    pub rating: i64,
    pub starred: bool,
    pub ranking: f64,
    pub duration: Option<f64>,
    pub play_count: i64,
    pub last_played: Option<i64>,
    pub created: i64,
    pub is_streaming: bool,
    pub kind: Option<String>,
    pub stream_url: Option<String>,
    pub collections: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub collection_id: i64,
    pub external_id: Option<String>,
    pub name: String,
    pub genre_name: Option<String>,
    pub special_kind: Option<String>,
    pub track_count: i64,
}

impl Collection {
    pub fn is_system(&self) -> bool {
        self.special_kind.is_some()
    }
}

/// Write-side shape of an item, as produced by ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    pub external_id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub collection: Option<String>,
    pub rating: i64,
    pub starred: bool,
    pub ranking: f64,
    pub duration: Option<f64>,
    pub play_count: i64,
    pub last_played: Option<i64>,
    pub created: Option<i64>,
    pub is_streaming: bool,
    pub kind: Option<String>,
    pub stream_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCollection {
    pub external_id: Option<String>,
    pub name: String,
    pub genre: Option<String>,
    pub special_kind: Option<String>,
    pub track_count: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted(i64),
    Updated(i64),
}

impl Upsert {
    pub fn id(self) -> i64 {
        match self {
            Upsert::Inserted(id) | Upsert::Updated(id) => id,
        }
    }

    pub fn is_inserted(self) -> bool {
        matches!(self, Upsert::Inserted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionRef {
    Name(String),
    ExternalId(String),
}

impl CollectionRef {
    pub fn new(reference: &str, by_external_id: bool) -> CollectionRef {
        if by_external_id {
            CollectionRef::ExternalId(reference.to_string())
        } else {
            CollectionRef::Name(reference.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryStats {
    pub items: i64,
    pub artists: i64,
    pub albums: i64,
    pub genres: i64,
    pub collections: i64,
    pub memberships: i64,
    pub starred: i64,
    pub streaming: i64,
    pub storage_bytes: i64,
}

pub struct LibrarySource {
    db_path: PathBuf,
    result_limit: usize,
}

pub struct Library {
    conn: Connection,
    db_path: PathBuf,
    result_limit: usize,
}

impl LibrarySource {
    /// Opens the database once, bringing its schema up to date. Fails if
    /// any migration fails; nothing should use a half-migrated store.
    pub fn create(db_path: PathBuf, result_limit: usize) -> Result<LibrarySource> {
        info!("using '{}'", db_path.to_string_lossy());

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let source = LibrarySource {
            db_path,
            result_limit: result_limit.max(1),
        };

        let mut conn = source.open()?;
        let version = db_meta::apply(&mut conn)?;

        debug!("schema at version {}", version);

        Ok(source)
    }

    pub fn from_config(config: &Config) -> Result<LibrarySource> {
        Self::create(config.db_path.clone(), config.result_limit)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        match Connection::open(&self.db_path) {
            Ok(conn) => {
                conn.busy_timeout(Duration::from_secs(5))?;
                Ok(conn)
            }
            Err(e) => {
                error!(
                    "can't open sqlite database '{}': {}",
                    self.db_path.to_string_lossy(),
                    e
                );
                Err(e.into())
            }
        }
    }

    /// A fresh connection. Give each thread its own.
    pub fn get(&self) -> Result<Library> {
        let conn = self.open()?;
        db_meta::tune(&conn)?;

        Ok(Library {
            conn,
            db_path: self.db_path.clone(),
            result_limit: self.result_limit,
        })
    }
}

fn or_sentinel<'a>(name: &'a str, sentinel: &'a str) -> &'a str {
    let name = name.trim();
    if name.is_empty() {
        sentinel
    } else {
        name
    }
}

fn normalize_kind(kind: Option<&str>) -> Option<String> {
    match kind.map(str::trim) {
        None | Some("") => None,
        Some(k) if k.eq_ignore_ascii_case("none") => None,
        Some(k) => Some(k.to_string()),
    }
}

pub(crate) fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    Ok(Item {
        item_id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        artist_name: row.get(3)?,
        album_name: row.get(4)?,
        genre_name: row.get(5)?,
        collection: row.get(6)?,
        rating: row.get(7)?,
        starred: row.get(8)?,
        ranking: row.get(9)?,
        duration: row.get(10)?,
        play_count: row.get(11)?,
        last_played: row.get(12)?,
        created: row.get(13)?,
        is_streaming: row.get(14)?,
        kind: row.get(15)?,
        stream_url: row.get(16)?,
        collections: Vec::new(),
        score: 0.0,
    })
}

impl Library {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn result_limit(&self) -> usize {
        self.result_limit
    }

    pub fn artist(&self, artist_id: i64) -> Result<Option<Artist>> {
        trace!("get artist artist_id={}", artist_id);

        Ok(self
            .conn
            .query_row(
                "SELECT artist_id, name FROM Artist WHERE artist_id = ?",
                [artist_id],
                |row| {
                    Ok(Artist {
                        artist_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        trace!("get artist name={}", name);

        Ok(self
            .conn
            .query_row(
                "SELECT artist_id, name FROM Artist WHERE name = ?",
                [name],
                |row| {
                    Ok(Artist {
                        artist_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Blank names map to "Unknown Artist".
    pub fn get_or_create_artist(&self, name: &str) -> Result<i64> {
        let name = or_sentinel(name, UNKNOWN_ARTIST);

        let created = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO Artist (name) VALUES (?)")?
            .execute([name])?;

        if created > 0 {
            debug!("create artist '{}'", name);
        }

        Ok(self
            .conn
            .prepare_cached("SELECT artist_id FROM Artist WHERE name = ?")?
            .query_row([name], |row| row.get(0))?)
    }

    pub fn genre_by_name(&self, name: &str) -> Result<Option<Genre>> {
        trace!("get genre name={}", name);

        Ok(self
            .conn
            .query_row(
                "SELECT genre_id, name FROM Genre WHERE name = ?",
                [name],
                |row| {
                    Ok(Genre {
                        genre_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    /// Blank names map to the reserved "Unknown" genre.
    pub fn get_or_create_genre(&self, name: &str) -> Result<i64> {
        let name = or_sentinel(name, UNKNOWN_GENRE);

        let created = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO Genre (name) VALUES (?)")?
            .execute([name])?;

        if created > 0 {
            debug!("create genre '{}'", name);
        }

        Ok(self
            .conn
            .prepare_cached("SELECT genre_id FROM Genre WHERE name = ?")?
            .query_row([name], |row| row.get(0))?)
    }

    pub fn album(&self, album_id: i64) -> Result<Option<Album>> {
        trace!("get album album_id={}", album_id);

        Ok(self
            .conn
            .query_row(
                "SELECT album_id, name, artist_id, genre_id FROM Album WHERE album_id = ?",
                [album_id],
                |row| {
                    Ok(Album {
                        album_id: row.get(0)?,
                        name: row.get(1)?,
                        artist_id: row.get(2)?,
                        genre_id: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// Albums are keyed by (name, artist). A genre fills in an album that
    /// has none yet but never replaces an existing one.
    pub fn get_or_create_album(
        &self,
        name: &str,
        artist_id: i64,
        genre_id: Option<i64>,
    ) -> Result<i64> {
        let name = or_sentinel(name, UNKNOWN_ALBUM);

        let created = self
            .conn
            .prepare_cached(
                "INSERT OR IGNORE INTO Album (name, artist_id, genre_id) VALUES (?, ?, ?)",
            )?
            .execute(params![name, artist_id, genre_id])?;

        if created > 0 {
            debug!("create album '{}' artist_id={}", name, artist_id);
        }

        let album_id: i64 = self
            .conn
            .prepare_cached("SELECT album_id FROM Album WHERE name = ? AND artist_id = ?")?
            .query_row(params![name, artist_id], |row| row.get(0))?;

        if created == 0 && genre_id.is_some() {
            self.conn
                .prepare_cached(
                    "UPDATE Album SET genre_id = ? WHERE album_id = ? AND genre_id IS NULL",
                )?
                .execute(params![genre_id, album_id])?;
        }

        Ok(album_id)
    }

    pub fn item_id_by_external_id(&self, external_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .prepare_cached("SELECT item_id FROM Item WHERE external_id = ?")?
            .query_row([external_id], |row| row.get(0))
            .optional()?)
    }

    /// Inserts the item, or updates it in place when its external id is
    /// already known. `created` is only written on insert.
    pub fn insert_item(&self, item: &NewItem) -> Result<Upsert> {
        let external_id = item.external_id.trim();
        if external_id.is_empty() {
            return Err(Error::Feed(format!(
                "item '{}' has no external id",
                item.name
            )));
        }

        let name = item.name.trim();
        if name.is_empty() {
            return Err(Error::Feed(format!("item {} has no name", external_id)));
        }

        let artist_id = self.get_or_create_artist(&item.artist)?;
        let genre_id = self.get_or_create_genre(&item.genre)?;
        let album_id = self.get_or_create_album(&item.album, artist_id, Some(genre_id))?;
        let rating = item.rating.max(0).min(100);

        if let Some(item_id) = self.item_id_by_external_id(external_id)? {
            trace!("update item {} item_id={}", external_id, item_id);

            self.conn
                .prepare_cached(
                    "UPDATE Item SET
                        name = ?, artist_id = ?, album_id = ?, genre_id = ?, collection = ?,
                        rating = ?, starred = ?, ranking = ?, duration = ?, play_count = ?,
                        last_played = ?, is_streaming = ?, kind = ?, stream_url = ?
                    WHERE item_id = ?",
                )?
                .execute(params![
                    name,
                    artist_id,
                    album_id,
                    genre_id,
                    item.collection,
                    rating,
                    item.starred,
                    item.ranking,
                    item.duration,
                    item.play_count,
                    item.last_played,
                    item.is_streaming,
                    item.kind,
                    item.stream_url,
                    item_id,
                ])?;

            return Ok(Upsert::Updated(item_id));
        }

        self.conn
            .prepare_cached(
                "INSERT INTO Item (
                    external_id, name, artist_id, album_id, genre_id, collection,
                    rating, starred, ranking, duration, play_count, last_played,
                    created, is_streaming, kind, stream_url)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    COALESCE(?, cast(strftime('%s','now') as int)), ?, ?, ?)",
            )?
            .execute(params![
                external_id,
                name,
                artist_id,
                album_id,
                genre_id,
                item.collection,
                rating,
                item.starred,
                item.ranking,
                item.duration,
                item.play_count,
                item.last_played,
                item.created,
                item.is_streaming,
                item.kind,
                item.stream_url,
            ])?;

        let item_id = self.conn.last_insert_rowid();

        debug!("create item {} item_id={}", external_id, item_id);

        Ok(Upsert::Inserted(item_id))
    }

    /// Looks up one item and attaches the names of the collections it
    /// belongs to. A miss is `Ok(None)`.
    pub fn item_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        trace!("get item external_id={}", external_id);

        let sql = format!("{} {} WHERE Item.external_id = ?", ITEM_SELECT, ITEM_FROM);

        let item = self
            .conn
            .query_row(&sql, [external_id], item_from_row)
            .optional()?;

        match item {
            Some(mut item) => {
                item.collections = self.item_collection_names(item.item_id)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    fn item_collection_names(&self, item_id: i64) -> Result<Vec<String>> {
        let mut st = self.conn.prepare_cached(
            "SELECT Collection.name
            FROM CollectionItem
            INNER JOIN Collection ON Collection.collection_id = CollectionItem.collection_id
            WHERE CollectionItem.item_id = ?
            ORDER BY Collection.name, Collection.collection_id",
        )?;

        let names = st
            .query_map([item_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(names)
    }

    pub fn record_play(&self, external_id: &str, played_at: i64) -> Result<()> {
        trace!("record play {} at {}", external_id, played_at);

        let changed = self.conn.execute(
            "UPDATE Item SET play_count = play_count + 1, last_played = ? WHERE external_id = ?",
            params![played_at, external_id],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!("item {}", external_id)));
        }

        Ok(())
    }

    pub fn collection_id_by_external_id(&self, external_id: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .prepare_cached("SELECT collection_id FROM Collection WHERE external_id = ?")?
            .query_row([external_id], |row| row.get(0))
            .optional()?)
    }

    /// First collection carrying the name, oldest wins.
    pub fn collection_id_by_name(&self, name: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .prepare_cached(
                "SELECT collection_id FROM Collection WHERE name = ?
                ORDER BY collection_id LIMIT 1",
            )?
            .query_row([name], |row| row.get(0))
            .optional()?)
    }

    pub fn collection_id(&self, reference: &CollectionRef) -> Result<Option<i64>> {
        match reference {
            CollectionRef::Name(name) => self.collection_id_by_name(name),
            CollectionRef::ExternalId(id) => self.collection_id_by_external_id(id),
        }
    }

    /// Matches by external id first. A row that was created without one
    /// (legacy data) is adopted by name and gets the id assigned.
    pub fn upsert_collection(&self, collection: &NewCollection) -> Result<Upsert> {
        let name = collection.name.trim();
        if name.is_empty() {
            return Err(Error::Feed("collection without a name".to_string()));
        }

        let external_id = collection
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let genre_id = match collection.genre.as_deref().map(str::trim) {
            Some(genre) if !genre.is_empty() => Some(self.get_or_create_genre(genre)?),
            _ => None,
        };

        let special_kind = normalize_kind(collection.special_kind.as_deref());

        let existing = match external_id {
            Some(id) => match self.collection_id_by_external_id(id)? {
                Some(collection_id) => Some(collection_id),
                None => self
                    .conn
                    .query_row(
                        "SELECT collection_id FROM Collection
                        WHERE name = ? AND external_id IS NULL
                        ORDER BY collection_id LIMIT 1",
                        [name],
                        |row| row.get(0),
                    )
                    .optional()?,
            },
            None => self.collection_id_by_name(name)?,
        };

        if let Some(collection_id) = existing {
            trace!("update collection '{}' collection_id={}", name, collection_id);

            self.conn.execute(
                "UPDATE Collection SET
                    external_id = COALESCE(?, external_id),
                    name = ?,
                    genre_id = COALESCE(?, genre_id),
                    special_kind = ?,
                    track_count = ?
                WHERE collection_id = ?",
                params![
                    external_id,
                    name,
                    genre_id,
                    special_kind,
                    collection.track_count,
                    collection_id
                ],
            )?;

            return Ok(Upsert::Updated(collection_id));
        }

        self.conn.execute(
            "INSERT INTO Collection (external_id, name, genre_id, special_kind, track_count)
            VALUES (?, ?, ?, ?, ?)",
            params![
                external_id,
                name,
                genre_id,
                special_kind,
                collection.track_count
            ],
        )?;

        let collection_id = self.conn.last_insert_rowid();

        debug!("create collection '{}' collection_id={}", name, collection_id);

        Ok(Upsert::Inserted(collection_id))
    }

    /// Existing collection with the name, or a new user collection without
    /// an external id.
    pub fn get_or_create_collection(&self, name: &str) -> Result<i64> {
        if let Some(collection_id) = self.collection_id_by_name(name.trim())? {
            return Ok(collection_id);
        }

        let upsert = self.upsert_collection(&NewCollection {
            name: name.to_string(),
            ..Default::default()
        })?;

        Ok(upsert.id())
    }

    /// Deletes every membership of the collection and inserts `item_ids`
    /// at positions 0.. in order. Repeated ids keep their first position.
    /// Callers wanting atomicity wrap this in a transaction.
    pub fn replace_collection_items(&self, collection_id: i64, item_ids: &[i64]) -> Result<usize> {
        trace!(
            "replace collection items collection_id={} count={}",
            collection_id,
            item_ids.len()
        );

        self.conn
            .prepare_cached("DELETE FROM CollectionItem WHERE collection_id = ?")?
            .execute([collection_id])?;

        let mut st = self.conn.prepare_cached(
            "INSERT INTO CollectionItem (collection_id, item_id, position) VALUES (?, ?, ?)",
        )?;

        let mut seen = HashSet::new();
        let mut position: i64 = 0;

        for &item_id in item_ids {
            if !seen.insert(item_id) {
                continue;
            }

            st.execute(params![collection_id, item_id, position])?;
            position += 1;
        }

        Ok(position as usize)
    }

    pub fn set_collection_track_count(&self, collection_id: i64, track_count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE Collection SET track_count = ? WHERE collection_id = ?",
            params![track_count, collection_id],
        )?;
        Ok(())
    }

    pub fn collections(&self) -> Result<Vec<Collection>> {
        trace!("list collections");

        let mut st = self.conn.prepare(
            "SELECT
                Collection.collection_id,
                Collection.external_id,
                Collection.name,
                Genre.name,
                Collection.special_kind,
                Collection.track_count
            FROM Collection
            LEFT OUTER JOIN Genre ON Genre.genre_id = Collection.genre_id
            ORDER BY Collection.name, Collection.collection_id",
        )?;

        let mut rows = st.query([])?;
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            result.push(Collection {
                collection_id: row.get(0)?,
                external_id: row.get(1)?,
                name: row.get(2)?,
                genre_name: row.get(3)?,
                special_kind: row.get(4)?,
                track_count: row.get(5)?,
            });
        }

        Ok(result)
    }

    /// Items of a collection in stored position order.
    pub fn collection_items(&self, reference: &CollectionRef) -> Result<Vec<Item>> {
        trace!("get collection items {:?}", reference);

        let collection_id = match self.collection_id(reference)? {
            Some(id) => id,
            None => return Err(Error::NotFound(format!("collection {:?}", reference))),
        };

        let sql = format!(
            "{} {}
            INNER JOIN CollectionItem ON CollectionItem.item_id = Item.item_id
            WHERE CollectionItem.collection_id = ?
            ORDER BY CollectionItem.position",
            ITEM_SELECT, ITEM_FROM
        );

        let mut st = self.conn.prepare(&sql)?;
        let items = st
            .query_map([collection_id], item_from_row)?
            .collect::<rusqlite::Result<Vec<Item>>>()?;

        Ok(items)
    }

    pub fn search(&self, text: &str, filters: &SearchFilters) -> Result<SearchOutcome> {
        query::search(
            &self.conn,
            text,
            filters,
            self.result_limit,
            chrono::Utc::now().timestamp(),
        )
    }

    fn count(&self, sql: &str) -> Result<i64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    pub fn item_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM Item")
    }

    pub fn search_index_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM ItemSearch")
    }

    /// Drops and repopulates the full-text projection from the item table.
    pub fn rebuild_search_index(&self) -> Result<usize> {
        debug!("rebuild search index");

        self.conn.execute("DELETE FROM ItemSearch", [])?;

        let count = self.conn.execute(
            "INSERT INTO ItemSearch (rowid, name, artist, album, genre, collection)
            SELECT Item.item_id, Item.name, Artist.name, Album.name, Genre.name, Item.collection
            FROM Item
            INNER JOIN Artist ON Artist.artist_id = Item.artist_id
            INNER JOIN Album ON Album.album_id = Item.album_id
            INNER JOIN Genre ON Genre.genre_id = Item.genre_id",
            [],
        )?;

        Ok(count)
    }

    /// Bytes held by the `-wal` and `-shm` files next to the database.
    fn sidecar_bytes(&self) -> i64 {
        ["-wal", "-shm"]
            .iter()
            .filter_map(|suffix| {
                let mut path = self.db_path.clone().into_os_string();
                path.push(suffix);
                std::fs::metadata(path).ok()
            })
            .map(|meta| meta.len() as i64)
            .sum()
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let page_count = self.count("PRAGMA page_count")?;
        let page_size = self.count("PRAGMA page_size")?;

        Ok(LibraryStats {
            items: self.item_count()?,
            artists: self.count("SELECT COUNT(*) FROM Artist")?,
            albums: self.count("SELECT COUNT(*) FROM Album")?,
            genres: self.count("SELECT COUNT(*) FROM Genre")?,
            collections: self.count("SELECT COUNT(*) FROM Collection")?,
            memberships: self.count("SELECT COUNT(*) FROM CollectionItem")?,
            starred: self.count("SELECT COUNT(*) FROM Item WHERE starred = 1")?,
            streaming: self.count("SELECT COUNT(*) FROM Item WHERE is_streaming = 1")?,
            storage_bytes: page_count * page_size + self.sidecar_bytes(),
        })
    }
}
