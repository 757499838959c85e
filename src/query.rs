use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::library::{item_from_row, Item, ITEM_FROM, ITEM_SELECT};

pub const FULL_TEXT_WEIGHT: f64 = 10.0;
pub const EXACT_NAME_WEIGHT: f64 = 6.0;
pub const EXACT_ARTIST_WEIGHT: f64 = 4.0;
pub const STARRED_BONUS: f64 = 5.0;
pub const PLAY_COUNT_WEIGHT: f64 = 0.1;

/// (days since last play, bonus), checked in order.
pub const RECENCY_TIERS: [(i64, f64); 3] = [(7, 3.0), (30, 2.0), (90, 1.0)];

const DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFilter {
    Any,
    StreamingOnly,
    LocalOnly,
}

impl Default for SourceFilter {
    fn default() -> SourceFilter {
        SourceFilter::Any
    }
}

/// Structured search filters. Every filter left at its default is omitted
/// from the query; the rest are combined with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub genre: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub collection: Option<String>,
    pub collection_id: Option<String>,
    pub starred_only: bool,
    pub min_rating: Option<i64>,
    pub source: SourceFilter,
    pub limit: Option<usize>,
    pub ranked: bool,
}

impl Default for SearchFilters {
    fn default() -> SearchFilters {
        SearchFilters {
            genre: None,
            artist: None,
            album: None,
            collection: None,
            collection_id: None,
            starred_only: false,
            min_rating: None,
            source: SourceFilter::Any,
            limit: None,
            ranked: true,
        }
    }
}

impl SearchFilters {
    pub fn check(&self) -> Result<()> {
        if let Some(rating) = self.min_rating {
            if rating < 0 || rating > 100 {
                return Err(Error::InvalidFilter(format!(
                    "min_rating {} outside 0..=100",
                    rating
                )));
            }
        }

        Ok(())
    }

    pub fn effective_limit(&self, default_limit: usize) -> usize {
        self.limit.unwrap_or(default_limit).max(1)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// FTS5 match against the item projection.
    FullText,
    /// LIKE fallback after the full-text path failed.
    Substring,
    /// No text, filters only.
    Browse,
    /// Answered from the search cache.
    Cache,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub items: Vec<Item>,
    pub method: SearchMethod,
}

pub(crate) struct QueryOptions {
    select_values: Vec<Box<dyn ToSql>>,
    clauses: Vec<String>,
    values: Vec<Box<dyn ToSql>>,
    order_string: Option<String>,
    limit: Option<i64>,
}

impl QueryOptions {
    pub fn new() -> QueryOptions {
        QueryOptions {
            select_values: Vec::new(),
            clauses: Vec::new(),
            values: Vec::new(),
            order_string: None,
            limit: None,
        }
    }

    /// Binds a value used by the select list, ahead of any filter value.
    pub fn select_value<T>(&mut self, value: T)
    where
        T: ToSql,
        T: 'static,
    {
        self.select_values.push(Box::new(value));
    }

    pub fn filter(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    pub fn filter_value<T>(&mut self, clause: &str, value: T)
    where
        T: ToSql,
        T: 'static,
    {
        self.clauses.push(clause.to_string());
        self.values.push(Box::new(value));
    }

    pub fn filter_values(&mut self, clause: &str, values: Vec<Box<dyn ToSql>>) {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
    }

    /// Skips absent and blank values.
    pub fn bind_filter_str(&mut self, value: &Option<String>, clause: &str) {
        if let Some(value) = value.as_deref().map(str::trim) {
            if !value.is_empty() {
                self.filter_value(clause, value.to_string());
            }
        }
    }

    pub fn order_string(&mut self, order_string: &str) {
        self.order_string = Some(order_string.to_string());
    }

    pub fn limit(&mut self, limit: i64) {
        self.limit = Some(limit);
    }

    pub fn into_sql(self, select_from: &str) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = select_from.to_string();
        let mut values = self.select_values;

        if !self.clauses.is_empty() {
            sql += " WHERE ";
            sql += &self.clauses.join(" AND ");
        }

        values.extend(self.values);

        if let Some(order) = self.order_string {
            sql += " ORDER BY ";
            sql += &order;
        }

        if let Some(limit) = self.limit {
            sql += " LIMIT ?";
            values.push(Box::new(limit));
        }

        (sql, values)
    }
}

/// FTS5 expression for free text. One term becomes a prefix match, several
/// terms become a conjunction of phrases. Terms without a letter or digit
/// tokenize to nothing and are dropped. None when no term is left.
pub fn match_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    match terms.len() {
        0 => None,
        1 => Some(format!("{}*", terms[0])),
        _ => Some(terms.join(" AND ")),
    }
}

/// `%text%` with LIKE wildcards in the text escaped by backslash.
pub fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);

    for c in text.trim().chars() {
        if c == '%' || c == '_' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    format!("%{}%", escaped)
}

fn recency_score(opts: &mut QueryOptions, now: i64) -> String {
    let mut sql = String::from("(CASE WHEN Item.last_played IS NULL THEN 0.0");

    for (days, bonus) in RECENCY_TIERS.iter() {
        sql += &format!(" WHEN Item.last_played >= ? THEN {:.1}", bonus);
        opts.select_value(now - days * DAY);
    }

    sql += " ELSE 0.0 END)";
    sql
}

/// Builds the statement and its parameters for one search attempt. The
/// caller picks the method; `now` anchors the recency tiers so results are
/// reproducible.
pub fn build(
    text: &str,
    filters: &SearchFilters,
    method: SearchMethod,
    now: i64,
    default_limit: usize,
) -> (String, Vec<Box<dyn ToSql>>) {
    let text = text.trim();
    let expression = match_expression(text);

    let method = match (method, &expression) {
        _ if text.is_empty() => SearchMethod::Browse,
        (SearchMethod::Substring, _) | (_, None) => SearchMethod::Substring,
        (_, Some(_)) => SearchMethod::FullText,
    };

    let mut opts = QueryOptions::new();

    let score = if filters.ranked {
        let text_score = match method {
            SearchMethod::FullText => format!("{:.1}", FULL_TEXT_WEIGHT),
            SearchMethod::Substring => {
                opts.select_value(text.to_string());
                opts.select_value(text.to_string());
                opts.select_value(text.to_string());

                format!(
                    "(CASE
                        WHEN Item.name = ? COLLATE NOCASE THEN {:.1}
                        WHEN Artist.name = ? COLLATE NOCASE OR Album.name = ? COLLATE NOCASE THEN {:.1}
                        ELSE 0.0 END)",
                    EXACT_NAME_WEIGHT, EXACT_ARTIST_WEIGHT
                )
            }
            _ => "0.0".to_string(),
        };

        format!(
            "{} + (CASE WHEN Item.starred THEN {:.1} ELSE 0.0 END) + Item.play_count * {} + {}",
            text_score,
            STARRED_BONUS,
            PLAY_COUNT_WEIGHT,
            recency_score(&mut opts, now)
        )
    } else {
        "0.0".to_string()
    };

    match (method, expression) {
        (SearchMethod::FullText, Some(expression)) => {
            opts.filter_value(
                "Item.item_id IN (SELECT rowid FROM ItemSearch WHERE ItemSearch MATCH ?)",
                expression,
            );
        }
        (SearchMethod::Substring, _) => {
            let pattern = like_pattern(text);
            let values: Vec<Box<dyn ToSql>> = vec![
                Box::new(pattern.clone()),
                Box::new(pattern.clone()),
                Box::new(pattern),
            ];

            opts.filter_values(
                "(Item.name LIKE ? ESCAPE '\\' OR Artist.name LIKE ? ESCAPE '\\' OR Album.name LIKE ? ESCAPE '\\')",
                values,
            );
        }
        _ => {}
    }

    opts.bind_filter_str(&filters.genre, "Genre.name = ?");
    opts.bind_filter_str(&filters.artist, "Artist.name = ?");
    opts.bind_filter_str(&filters.album, "Album.name = ?");
    opts.bind_filter_str(
        &filters.collection,
        "Item.item_id IN (
            SELECT CollectionItem.item_id
            FROM CollectionItem
            INNER JOIN Collection ON Collection.collection_id = CollectionItem.collection_id
            WHERE Collection.name = ?)",
    );
    opts.bind_filter_str(
        &filters.collection_id,
        "Item.item_id IN (
            SELECT CollectionItem.item_id
            FROM CollectionItem
            INNER JOIN Collection ON Collection.collection_id = CollectionItem.collection_id
            WHERE Collection.external_id = ?)",
    );

    if filters.starred_only {
        opts.filter("Item.starred = 1");
    }

    if let Some(rating) = filters.min_rating {
        if rating > 0 {
            opts.filter_value("Item.rating >= ?", rating);
        }
    }

    match filters.source {
        SourceFilter::Any => {}
        SourceFilter::StreamingOnly => opts.filter("Item.is_streaming = 1"),
        SourceFilter::LocalOnly => opts.filter("Item.is_streaming = 0"),
    }

    if filters.ranked {
        opts.order_string("score DESC, Item.ranking DESC, Item.name ASC, Item.item_id ASC");
    } else {
        opts.order_string("Item.ranking DESC, Item.name ASC, Item.item_id ASC");
    }

    opts.limit(filters.effective_limit(default_limit) as i64);

    opts.into_sql(&format!(
        "{}, ({}) AS score {}",
        ITEM_SELECT, score, ITEM_FROM
    ))
}

fn run(conn: &Connection, sql: &str, values: &[Box<dyn ToSql>]) -> rusqlite::Result<Vec<Item>> {
    let mut st = conn.prepare(sql)?;
    let mut rows = st.query(params_from_iter(values.iter()))?;
    let mut items = Vec::new();

    while let Some(row) = rows.next()? {
        let mut item = item_from_row(row)?;
        item.score = row.get(17)?;
        items.push(item);
    }

    Ok(items)
}

/// Runs a search. Text goes through the full-text index first; if that
/// statement fails (malformed match syntax and the like) the same search is
/// retried as a substring match. Text with nothing the index can tokenize
/// goes straight to substring. No match is an empty list, not an error.
pub fn search(
    conn: &Connection,
    text: &str,
    filters: &SearchFilters,
    default_limit: usize,
    now: i64,
) -> Result<SearchOutcome> {
    filters.check()?;

    if text.trim().is_empty() {
        let (sql, values) = build(text, filters, SearchMethod::Browse, now, default_limit);
        let items = run(conn, &sql, &values)?;

        return Ok(SearchOutcome {
            items,
            method: SearchMethod::Browse,
        });
    }

    if match_expression(text).is_none() {
        let (sql, values) = build(text, filters, SearchMethod::Substring, now, default_limit);
        let items = run(conn, &sql, &values)?;

        return Ok(SearchOutcome {
            items,
            method: SearchMethod::Substring,
        });
    }

    let (sql, values) = build(text, filters, SearchMethod::FullText, now, default_limit);

    match run(conn, &sql, &values) {
        Ok(items) => Ok(SearchOutcome {
            items,
            method: SearchMethod::FullText,
        }),
        Err(e) => {
            warn!("full-text search for '{}' failed, using substring: {}", text, e);

            let (sql, values) = build(text, filters, SearchMethod::Substring, now, default_limit);
            let items = run(conn, &sql, &values)?;

            Ok(SearchOutcome {
                items,
                method: SearchMethod::Substring,
            })
        }
    }
}
