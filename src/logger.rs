use chrono::prelude::*;
use log::{Level, LevelFilter, Metadata, Record};

const CRATE_NAME: &str = "musicdex";
const TARGET_PREFIX: &str = "musicdex::";

pub const ENV_LOG: &str = "MUSICDEX_LOG";

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        let target = record.target();

        if self.enabled(record.metadata())
            && (target == CRATE_NAME || target.starts_with(TARGET_PREFIX))
        {
            eprintln!(
                "{} {:05} [{}] {}",
                Local::now().format("%F %T"),
                record.level(),
                target.get(TARGET_PREFIX.len()..).unwrap_or(target),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

pub fn level_from(value: Option<&str>) -> LevelFilter {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("off") => LevelFilter::Off,
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Installs the stderr logger. Level comes from `MUSICDEX_LOG`, info when
/// unset. A second call keeps the first logger.
pub fn init() {
    let level = level_from(std::env::var(ENV_LOG).ok().as_deref());

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(level_from(None), LevelFilter::Info);
        assert_eq!(level_from(Some("TRACE")), LevelFilter::Trace);
        assert_eq!(level_from(Some(" warn ")), LevelFilter::Warn);
        assert_eq!(level_from(Some("bogus")), LevelFilter::Info);
    }
}
