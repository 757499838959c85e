use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "~/.musicdex/library.db";
pub const DEFAULT_RESULT_LIMIT: usize = 15;
pub const DEFAULT_CACHE_CAPACITY: usize = 100;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

pub const ENV_DB_PATH: &str = "MUSICDEX_DB_PATH";
pub const ENV_RESULT_LIMIT: &str = "MUSICDEX_RESULT_LIMIT";
pub const ENV_CACHE_CAPACITY: &str = "MUSICDEX_CACHE_CAPACITY";
pub const ENV_CACHE_TTL: &str = "MUSICDEX_CACHE_TTL";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub result_limit: usize,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            db_path: expand_path(DEFAULT_DB_PATH),
            result_limit: DEFAULT_RESULT_LIMIT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset, unparsable
    /// or non-positive numeric values fall back to the built-in defaults.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup(ENV_DB_PATH) {
            if !path.trim().is_empty() {
                config.db_path = expand_path(path.trim());
            }
        }

        if let Some(limit) = positive(lookup(ENV_RESULT_LIMIT), ENV_RESULT_LIMIT) {
            config.result_limit = limit as usize;
        }

        if let Some(capacity) = positive(lookup(ENV_CACHE_CAPACITY), ENV_CACHE_CAPACITY) {
            config.cache_capacity = capacity as usize;
        }

        if let Some(ttl) = positive(lookup(ENV_CACHE_TTL), ENV_CACHE_TTL) {
            config.cache_ttl = Duration::from_secs(ttl);
        }

        config
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn positive(value: Option<String>, key: &str) -> Option<u64> {
    let value = value?;

    match value.trim().parse::<u64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            warn!("ignoring invalid {}='{}'", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_overrides() {
        let config = config_from(&[]);

        assert_eq!(config.result_limit, DEFAULT_RESULT_LIMIT);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
        assert!(config.db_path.ends_with(".musicdex/library.db"));
    }

    #[test]
    fn valid_overrides_apply() {
        let config = config_from(&[
            (ENV_DB_PATH, "/tmp/other.db"),
            (ENV_RESULT_LIMIT, "40"),
            (ENV_CACHE_CAPACITY, "7"),
            (ENV_CACHE_TTL, "12"),
        ]);

        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.result_limit, 40);
        assert_eq!(config.cache_capacity, 7);
        assert_eq!(config.cache_ttl, Duration::from_secs(12));
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let config = config_from(&[
            (ENV_RESULT_LIMIT, "0"),
            (ENV_CACHE_CAPACITY, "-3"),
            (ENV_CACHE_TTL, "soon"),
        ]);

        assert_eq!(config.result_limit, DEFAULT_RESULT_LIMIT);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(config.cache_ttl, Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
    }
}
