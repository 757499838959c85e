pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const LEDGER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS SchemaVersion (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied INTEGER NOT NULL DEFAULT (cast(strftime('%s','now') as int)));
";

const CORE_UP: &str = "
CREATE TABLE Artist (
    artist_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE);

CREATE TABLE Genre (
    genre_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE);

INSERT INTO Genre (name) VALUES ('Unknown');

CREATE TABLE Album (
    album_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    artist_id INTEGER NOT NULL,
    genre_id INTEGER,
    UNIQUE(name, artist_id),
    FOREIGN KEY(artist_id) REFERENCES Artist(artist_id),
    FOREIGN KEY(genre_id) REFERENCES Genre(genre_id));

CREATE INDEX Album_artist_id ON Album (artist_id);

CREATE TABLE Item (
    item_id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    artist_id INTEGER NOT NULL,
    album_id INTEGER NOT NULL,
    genre_id INTEGER NOT NULL,
    collection TEXT,
    rating INTEGER NOT NULL DEFAULT 0 CHECK (rating BETWEEN 0 AND 100),
    starred INTEGER NOT NULL DEFAULT 0,
    ranking REAL NOT NULL DEFAULT 0,
    duration REAL,
    play_count INTEGER NOT NULL DEFAULT 0,
    last_played INTEGER,
    created INTEGER NOT NULL DEFAULT (cast(strftime('%s','now') as int)),
    FOREIGN KEY(artist_id) REFERENCES Artist(artist_id),
    FOREIGN KEY(album_id) REFERENCES Album(album_id),
    FOREIGN KEY(genre_id) REFERENCES Genre(genre_id));

CREATE INDEX Item_artist_id ON Item (artist_id);
CREATE INDEX Item_album_id ON Item (album_id);
CREATE INDEX Item_genre_id ON Item (genre_id);

CREATE TABLE Collection (
    collection_id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT UNIQUE,
    name TEXT NOT NULL,
    genre_id INTEGER,
    special_kind TEXT,
    track_count INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY(genre_id) REFERENCES Genre(genre_id));

CREATE INDEX Collection_name ON Collection (name);

CREATE TABLE CollectionItem (
    collection_id INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY(collection_id, item_id),
    UNIQUE(collection_id, position),
    FOREIGN KEY(collection_id) REFERENCES Collection(collection_id) ON DELETE CASCADE,
    FOREIGN KEY(item_id) REFERENCES Item(item_id) ON DELETE CASCADE);

CREATE INDEX CollectionItem_item_id ON CollectionItem (item_id);
";

const CORE_DOWN: &str = "
DROP TABLE CollectionItem;
DROP TABLE Collection;
DROP TABLE Item;
DROP TABLE Album;
DROP TABLE Genre;
DROP TABLE Artist;
";

const SEARCH_UP: &str = "
CREATE VIRTUAL TABLE ItemSearch USING fts5(
    name,
    artist,
    album,
    genre,
    collection,
    tokenize = 'unicode61 remove_diacritics 2');

CREATE TRIGGER Item_search_insert AFTER INSERT ON Item BEGIN
    INSERT INTO ItemSearch (rowid, name, artist, album, genre, collection)
    VALUES (
        new.item_id,
        new.name,
        (SELECT name FROM Artist WHERE artist_id = new.artist_id),
        (SELECT name FROM Album WHERE album_id = new.album_id),
        (SELECT name FROM Genre WHERE genre_id = new.genre_id),
        new.collection);
END;

CREATE TRIGGER Item_search_update AFTER UPDATE ON Item BEGIN
    DELETE FROM ItemSearch WHERE rowid = old.item_id;
    INSERT INTO ItemSearch (rowid, name, artist, album, genre, collection)
    VALUES (
        new.item_id,
        new.name,
        (SELECT name FROM Artist WHERE artist_id = new.artist_id),
        (SELECT name FROM Album WHERE album_id = new.album_id),
        (SELECT name FROM Genre WHERE genre_id = new.genre_id),
        new.collection);
END;

CREATE TRIGGER Item_search_delete AFTER DELETE ON Item BEGIN
    DELETE FROM ItemSearch WHERE rowid = old.item_id;
END;

INSERT INTO ItemSearch (rowid, name, artist, album, genre, collection)
SELECT Item.item_id, Item.name, Artist.name, Album.name, Genre.name, Item.collection
FROM Item
INNER JOIN Artist ON Artist.artist_id = Item.artist_id
INNER JOIN Album ON Album.album_id = Item.album_id
INNER JOIN Genre ON Genre.genre_id = Item.genre_id;
";

const SEARCH_DOWN: &str = "
DROP TRIGGER Item_search_delete;
DROP TRIGGER Item_search_update;
DROP TRIGGER Item_search_insert;
DROP TABLE ItemSearch;
";

const STREAMING_UP: &str = "
ALTER TABLE Item ADD COLUMN is_streaming INTEGER NOT NULL DEFAULT 0;
ALTER TABLE Item ADD COLUMN kind TEXT;
ALTER TABLE Item ADD COLUMN stream_url TEXT;

CREATE INDEX Item_is_streaming ON Item (is_streaming);
";

const STREAMING_DOWN: &str = "
DROP INDEX Item_is_streaming;

ALTER TABLE Item DROP COLUMN stream_url;
ALTER TABLE Item DROP COLUMN kind;
ALTER TABLE Item DROP COLUMN is_streaming;
";

const RANKING_UP: &str = "
CREATE INDEX Item_starred ON Item (starred);
CREATE INDEX Item_play_count ON Item (play_count);
CREATE INDEX Item_last_played ON Item (last_played);
CREATE INDEX Item_ranking ON Item (ranking DESC, name);
";

const RANKING_DOWN: &str = "
DROP INDEX Item_ranking;
DROP INDEX Item_last_played;
DROP INDEX Item_play_count;
DROP INDEX Item_starred;
";

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core",
        up: CORE_UP,
        down: CORE_DOWN,
    },
    Migration {
        version: 2,
        name: "search",
        up: SEARCH_UP,
        down: SEARCH_DOWN,
    },
    Migration {
        version: 3,
        name: "streaming",
        up: STREAMING_UP,
        down: STREAMING_DOWN,
    },
    Migration {
        version: 4,
        name: "ranking",
        up: RANKING_UP,
        down: RANKING_DOWN,
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}
