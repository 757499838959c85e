#[macro_use]
extern crate log;

use std::sync::Arc;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use rusqlite::Connection;
use serde::Serialize;

use musicdex::config::{self, Config};
use musicdex::db_meta;
use musicdex::feed::Feed;
use musicdex::ingest::{self, IngestOptions, IngestProgress};
use musicdex::library::{CollectionRef, LibrarySource};
use musicdex::logger;
use musicdex::query::{SearchFilters, SourceFilter};
use musicdex::{Error, Result, MUSICDEX_VERSION};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_number<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidArgument(format!("--{} '{}' is not a number", name, value))),
        None => Ok(None),
    }
}

fn filters_from(matches: &ArgMatches) -> Result<SearchFilters> {
    let source = if matches.is_present("streaming") {
        SourceFilter::StreamingOnly
    } else if matches.is_present("local") {
        SourceFilter::LocalOnly
    } else {
        SourceFilter::Any
    };

    Ok(SearchFilters {
        genre: matches.value_of("genre").map(String::from),
        artist: matches.value_of("artist").map(String::from),
        album: matches.value_of("album").map(String::from),
        collection: matches.value_of("collection").map(String::from),
        collection_id: matches.value_of("collection-id").map(String::from),
        starred_only: matches.is_present("starred"),
        min_rating: parse_number(matches, "min-rating")?,
        source,
        limit: parse_number(matches, "limit")?,
        ranked: !matches.is_present("unranked"),
    })
}

fn migrate(config: &Config, matches: &ArgMatches) -> Result<()> {
    let version = match parse_number::<u32>(matches, "downgrade")? {
        Some(target) => {
            let mut conn = Connection::open(&config.db_path)?;
            db_meta::downgrade(&mut conn, target)?
        }
        None => {
            let source = LibrarySource::from_config(config)?;
            db_meta::current_version(source.get()?.connection())?
        }
    };

    print_json(&serde_json::json!({ "version": version }))
}

fn run(matches: &ArgMatches) -> Result<()> {
    let mut config = Config::from_env();

    if let Some(path) = matches.value_of("database") {
        config.db_path = config::expand_path(path);
    }

    if let ("migrate", Some(sub)) = matches.subcommand() {
        return migrate(&config, sub);
    }

    let source = LibrarySource::from_config(&config)?;
    let library = source.get()?;

    match matches.subcommand() {
        ("ingest", Some(sub)) => {
            let path = sub.value_of("file").unwrap_or_default();
            let feed = Feed::from_json(&std::fs::read_to_string(path)?)?;

            let options = IngestOptions {
                progress: Some(Arc::new(|p: IngestProgress| {
                    info!(
                        "{:?} {}/{} ({:.1}s)",
                        p.stage,
                        p.processed,
                        p.total,
                        p.elapsed.as_secs_f64()
                    )
                })),
                ..Default::default()
            };

            print_json(&ingest::populate(&library, feed, &options)?)
        }
        ("search", Some(sub)) => {
            let text = sub.value_of("text").unwrap_or_default();
            print_json(&library.search(text, &filters_from(sub)?)?)
        }
        ("show", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            match library.item_by_external_id(id)? {
                Some(item) => print_json(&item),
                None => Err(Error::NotFound(format!("item {}", id))),
            }
        }
        ("played", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            let at = parse_number::<i64>(sub, "at")?
                .unwrap_or_else(|| chrono::Utc::now().timestamp());
            library.record_play(id, at)?;
            print_json(&library.item_by_external_id(id)?)
        }
        ("collections", Some(_)) => print_json(&library.collections()?),
        ("collection", Some(sub)) => {
            let reference = CollectionRef::new(
                sub.value_of("ref").unwrap_or_default(),
                sub.is_present("by-id"),
            );
            print_json(&library.collection_items(&reference)?)
        }
        ("sync-collection", Some(sub)) => {
            let id = sub.value_of("id").unwrap_or_default();
            let items: Vec<String> = sub
                .values_of("items")
                .map(|values| values.map(String::from).collect())
                .unwrap_or_default();
            let count = ingest::sync_collection(&library, id, &items)?;
            print_json(&serde_json::json!({ "collection": id, "items": count }))
        }
        ("stats", Some(_)) => print_json(&library.stats()?),
        ("validate", Some(_)) => print_json(&ingest::validate(&library)?.into_result()?),
        _ => Ok(()),
    }
}

fn main() {
    let filter_args = vec![
        Arg::with_name("genre").long("genre").takes_value(true),
        Arg::with_name("artist").long("artist").takes_value(true),
        Arg::with_name("album").long("album").takes_value(true),
        Arg::with_name("collection")
            .long("collection")
            .help("Collection name")
            .takes_value(true),
        Arg::with_name("collection-id")
            .long("collection-id")
            .help("Collection external id")
            .takes_value(true),
        Arg::with_name("starred").long("starred"),
        Arg::with_name("min-rating")
            .long("min-rating")
            .help("Minimum rating, 0-100")
            .takes_value(true),
        Arg::with_name("streaming")
            .long("streaming")
            .conflicts_with("local"),
        Arg::with_name("local").long("local"),
        Arg::with_name("limit").long("limit").takes_value(true),
        Arg::with_name("unranked")
            .long("unranked")
            .help("Order by name only"),
    ];

    let matches = App::new("musicdex")
        .version(MUSICDEX_VERSION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("database")
                .long("database")
                .help("Database file, overrides MUSICDEX_DB_PATH")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("migrate")
                .about("Bring the schema up to date")
                .arg(
                    Arg::with_name("downgrade")
                        .long("downgrade")
                        .help("Revert to the given schema version")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("ingest")
                .about("Ingest an extractor feed")
                .arg(Arg::with_name("file").required(true)),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Ranked search")
                .arg(Arg::with_name("text").default_value(""))
                .args(&filter_args),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("Show one item by external id")
                .arg(Arg::with_name("id").required(true)),
        )
        .subcommand(
            SubCommand::with_name("played")
                .about("Record a play of an item")
                .arg(Arg::with_name("id").required(true))
                .arg(
                    Arg::with_name("at")
                        .long("at")
                        .help("Unix time of the play, now by default")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("collections").about("List collections"))
        .subcommand(
            SubCommand::with_name("collection")
                .about("List the items of a collection in order")
                .arg(Arg::with_name("ref").required(true))
                .arg(
                    Arg::with_name("by-id")
                        .long("by-id")
                        .help("Treat REF as an external id"),
                ),
        )
        .subcommand(
            SubCommand::with_name("sync-collection")
                .about("Replace a collection's membership")
                .arg(Arg::with_name("id").required(true))
                .arg(Arg::with_name("items").multiple(true)),
        )
        .subcommand(SubCommand::with_name("stats").about("Library statistics"))
        .subcommand(SubCommand::with_name("validate").about("Check the search index"))
        .get_matches();

    logger::init();

    info!("{}", MUSICDEX_VERSION);

    if let Err(e) = run(&matches) {
        error!("{}", e);
        std::process::exit(1);
    }
}
