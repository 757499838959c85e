//! Input shapes produced by the library extractor.
//!
//! Two layouts exist. The enhanced one is an object carrying a status,
//! tracks, playlists and stats; the legacy one is a bare list of tracks
//! (or an object with tracks only) where playlist membership is known only
//! from names embedded in each track. `Feed::from_json` decides which one it
//! is looking at, so nothing downstream has to.

use std::collections::{HashMap, HashSet};

use chrono::DateTime;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::library::{NewCollection, NewItem};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedItem {
    #[serde(alias = "persistent_id", alias = "id")]
    pub external_id: String,
    pub name: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, alias = "playlist")]
    pub collection: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub rating: i64,
    #[serde(default, alias = "loved", alias = "favorited", deserialize_with = "or_default")]
    pub starred: bool,
    #[serde(default, deserialize_with = "or_default")]
    pub ranking: f64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "or_default")]
    pub play_count: i64,
    #[serde(default, deserialize_with = "timestamp")]
    pub last_played: Option<i64>,
    #[serde(default, alias = "date_added", deserialize_with = "timestamp")]
    pub created: Option<i64>,
    #[serde(default, deserialize_with = "or_default")]
    pub is_streaming: bool,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default, alias = "playlists", deserialize_with = "or_default")]
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedCollection {
    #[serde(default, alias = "persistent_id", alias = "id")]
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub special_kind: Option<String>,
    #[serde(default, alias = "track_count", deserialize_with = "or_default")]
    pub item_count: i64,
    #[serde(default)]
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedStats {
    #[serde(default, alias = "track_count")]
    pub item_count: Option<i64>,
    #[serde(default, alias = "playlist_count")]
    pub collection_count: Option<i64>,
    #[serde(default, alias = "elapsed")]
    pub elapsed_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tracks: Vec<Value>,
    #[serde(default)]
    playlists: Option<Vec<Value>>,
    #[serde(default)]
    stats: Option<FeedStats>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFeed {
    Items(Vec<Value>),
    Envelope(Envelope),
}

/// Records are kept as raw JSON until ingestion so one malformed record
/// can be reported and skipped without rejecting the whole feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    Legacy {
        items: Vec<Value>,
    },
    Enhanced {
        items: Vec<Value>,
        collections: Vec<Value>,
        stats: FeedStats,
    },
}

/// A feed with collection definitions present in either case. For legacy
/// input they are synthesized from the embedded names.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedParts {
    pub items: Vec<Value>,
    pub collections: Vec<Value>,
    pub stats: FeedStats,
    pub legacy: bool,
}

impl Feed {
    pub fn from_json(data: &str) -> Result<Feed> {
        let raw: RawFeed = serde_json::from_str(data)?;

        match raw {
            RawFeed::Items(items) => Ok(Feed::Legacy { items }),
            RawFeed::Envelope(envelope) => {
                let status = envelope.status.as_deref().unwrap_or("success");

                if !status.eq_ignore_ascii_case("success") {
                    return Err(Error::Feed(format!(
                        "extractor reported '{}': {}",
                        status,
                        envelope.message.as_deref().unwrap_or("no message")
                    )));
                }

                match envelope.playlists {
                    Some(collections) => Ok(Feed::Enhanced {
                        items: envelope.tracks,
                        collections,
                        stats: envelope.stats.unwrap_or_default(),
                    }),
                    None => Ok(Feed::Legacy {
                        items: envelope.tracks,
                    }),
                }
            }
        }
    }

    pub fn from_items(items: &[FeedItem]) -> Result<Feed> {
        let items = items
            .iter()
            .map(to_value)
            .collect::<Result<Vec<Value>>>()?;

        Ok(Feed::Legacy { items })
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Feed::Legacy { .. })
    }

    pub fn into_parts(self) -> FeedParts {
        match self {
            Feed::Legacy { items } => {
                let collections = synthesize_collections(&items);

                FeedParts {
                    items,
                    collections,
                    stats: FeedStats::default(),
                    legacy: true,
                }
            }
            Feed::Enhanced {
                items,
                collections,
                stats,
            } => FeedParts {
                items,
                collections,
                stats,
                legacy: false,
            },
        }
    }
}

fn to_value(item: &FeedItem) -> Result<Value> {
    let mut value = serde_json::json!({
        "external_id": item.external_id,
        "name": item.name,
        "artist": item.artist,
        "album": item.album,
        "collection": item.collection,
        "genre": item.genre,
        "rating": item.rating,
        "starred": item.starred,
        "ranking": item.ranking,
        "duration": item.duration,
        "play_count": item.play_count,
        "last_played": item.last_played,
        "created": item.created,
        "is_streaming": item.is_streaming,
        "kind": item.kind,
        "stream_url": item.stream_url,
        "collections": item.collections,
    });

    // Nulls read as absent anyway; leave them out.
    if let Some(object) = value.as_object_mut() {
        object.retain(|_, v| !v.is_null());
    }

    Ok(value)
}

/// One collection per distinct embedded name, in first-seen order, with
/// the number of items naming it as the count. An item naming the same
/// collection twice counts once.
fn synthesize_collections(items: &[Value]) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, i64> = HashMap::new();

    for item in items {
        let names = item
            .get("collections")
            .or_else(|| item.get("playlists"))
            .and_then(Value::as_array);

        if let Some(names) = names {
            let mut listed = HashSet::new();

            for name in names.iter().filter_map(Value::as_str) {
                let name = name.trim();
                if name.is_empty() || !listed.insert(name) {
                    continue;
                }

                let count = counts.entry(name.to_string()).or_insert(0);
                if *count == 0 {
                    order.push(name.to_string());
                }
                *count += 1;
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let count = counts.get(&name).copied().unwrap_or(0);
            serde_json::json!({ "name": name, "item_count": count })
        })
        .collect()
}

impl FeedItem {
    pub fn from_value(value: &Value) -> Result<FeedItem> {
        Ok(FeedItem::deserialize(value)?)
    }

    pub fn to_new_item(&self) -> NewItem {
        NewItem {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            artist: self.artist.clone().unwrap_or_default(),
            album: self.album.clone().unwrap_or_default(),
            genre: self.genre.clone().unwrap_or_default(),
            collection: self.collection.clone().filter(|c| !c.trim().is_empty()),
            rating: self.rating,
            starred: self.starred,
            ranking: self.ranking,
            duration: self.duration,
            play_count: self.play_count.max(0),
            last_played: self.last_played,
            created: self.created,
            is_streaming: self.is_streaming || self.stream_url.is_some(),
            kind: self.kind.clone(),
            stream_url: self.stream_url.clone(),
        }
    }
}

impl FeedCollection {
    pub fn from_value(value: &Value) -> Result<FeedCollection> {
        Ok(FeedCollection::deserialize(value)?)
    }

    pub fn to_new_collection(&self) -> NewCollection {
        NewCollection {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            genre: self.genre.clone(),
            special_kind: self.special_kind.clone(),
            track_count: self.item_count.max(0),
        }
    }
}

/// Explicit nulls read as the field's default, like a missing field.
fn or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Unix seconds, a numeric string, or an RFC 3339 date.
fn timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let value = Option::<Value>::deserialize(deserializer)?;

    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => Ok(Some(v)),
            None => n
                .as_f64()
                .map(|v| Some(v as i64))
                .ok_or_else(|| D::Error::custom("timestamp out of range")),
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }

            if let Ok(v) = s.parse::<i64>() {
                return Ok(Some(v));
            }

            DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(dt.timestamp()))
                .map_err(|e| D::Error::custom(format!("invalid timestamp '{}': {}", s, e)))
        }
        Some(other) => Err(D::Error::custom(format!("invalid timestamp {}", other))),
    }
}
