use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::Result;
use crate::library::{Item, Library};
use crate::query::{SearchFilters, SearchMethod};

pub const DEFAULT_MAX_METRICS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchMetric {
    pub query: String,
    pub duration: Duration,
    pub result_count: usize,
    pub cache_hit: bool,
    pub method: SearchMethod,
}

struct Entry {
    items: Vec<Item>,
    inserted: Instant,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Entry>,
    order: VecDeque<String>,
}

/// In-process memo of search results in front of the ranker.
pub struct SearchCache {
    capacity: usize,
    ttl: Duration,
    max_metrics: usize,
    entries: Mutex<Entries>,
    metrics: Mutex<VecDeque<SearchMetric>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("{} lock poisoned, recovering", what);
        poisoned.into_inner()
    })
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn cache_key(text: &str, filters: &SearchFilters, default_limit: usize) -> Result<String> {
    let mut hasher = Sha256::new();

    hasher.update(normalize_text(text).as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_string(filters)?.as_bytes());
    hasher.update([0u8]);
    hasher.update(filters.effective_limit(default_limit).to_le_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}

impl SearchCache {
    pub fn new(capacity: usize, ttl: Duration, max_metrics: usize) -> SearchCache {
        info!(
            "search cache capacity={} ttl={}s",
            capacity,
            ttl.as_secs_f64()
        );

        SearchCache {
            capacity: capacity.max(1),
            ttl,
            max_metrics: max_metrics.max(1),
            entries: Mutex::new(Entries::default()),
            metrics: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &Config) -> SearchCache {
        Self::new(config.cache_capacity, config.cache_ttl, DEFAULT_MAX_METRICS)
    }

    fn lookup(&self, key: &str) -> Option<Vec<Item>> {
        let mut entries = lock(&self.entries, "cache");

        let expired = match entries.map.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                return Some(entry.items.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            trace!("expire {}", key);
            entries.map.remove(key);
            entries.order.retain(|k| k != key);
        }

        None
    }

    fn store(&self, key: String, items: Vec<Item>) {
        let mut entries = lock(&self.entries, "cache");

        if entries.map.contains_key(&key) {
            entries.order.retain(|k| k != &key);
        }

        while entries.map.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    trace!("capacity reached, evicting {}", oldest);
                    entries.map.remove(&oldest);
                }
                None => break,
            }
        }

        entries.order.push_back(key.clone());
        entries.map.insert(
            key,
            Entry {
                items,
                inserted: Instant::now(),
            },
        );
    }

    fn record(&self, metric: SearchMetric) {
        let mut metrics = lock(&self.metrics, "metrics");

        while metrics.len() >= self.max_metrics {
            metrics.pop_front();
        }

        metrics.push_back(metric);
    }

    /// Cached results for the same normalized text and filters, or a fresh
    /// ranker run stored for the next caller.
    pub fn search_with_cache(
        &self,
        library: &Library,
        text: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Item>> {
        let key = match cache_key(text, filters, library.result_limit()) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("can't key search '{}', bypassing cache: {}", text, e);
                None
            }
        };

        self.search_keyed(library, text, filters, key)
    }

    /// Without a key the ranker runs and nothing is stored.
    fn search_keyed(
        &self,
        library: &Library,
        text: &str,
        filters: &SearchFilters,
        key: Option<String>,
    ) -> Result<Vec<Item>> {
        let started = Instant::now();

        if let Some(items) = key.as_deref().and_then(|key| self.lookup(key)) {
            trace!("hit '{}'", text);

            self.record(SearchMetric {
                query: text.to_string(),
                duration: started.elapsed(),
                result_count: items.len(),
                cache_hit: true,
                method: SearchMethod::Cache,
            });

            return Ok(items);
        }

        let outcome = library.search(text, filters)?;

        self.record(SearchMetric {
            query: text.to_string(),
            duration: started.elapsed(),
            result_count: outcome.items.len(),
            cache_hit: false,
            method: outcome.method,
        });

        if let Some(key) = key {
            self.store(key, outcome.items.clone());
        }

        Ok(outcome.items)
    }

    pub fn clear(&self) {
        let mut entries = lock(&self.entries, "cache");
        debug!("clear {} entries", entries.map.len());
        entries.map.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries, "cache").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> Vec<SearchMetric> {
        lock(&self.metrics, "metrics").iter().cloned().collect()
    }

    pub fn average_search_time(&self) -> Option<Duration> {
        let metrics = lock(&self.metrics, "metrics");

        if metrics.is_empty() {
            return None;
        }

        let total: Duration = metrics.iter().map(|m| m.duration).sum();
        Some(total / metrics.len() as u32)
    }
}
