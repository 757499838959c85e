use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::schema::{self, Migration};

const TUNING: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA mmap_size = 268435456;
PRAGMA temp_store = MEMORY;
PRAGMA foreign_keys = ON;
";

/// Highest migration version recorded in the ledger, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.execute_batch(schema::LEDGER_SCHEMA)?;

    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM SchemaVersion", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Per-connection pragmas. Safe to run on every open.
pub fn tune(conn: &Connection) -> Result<()> {
    conn.execute_batch(TUNING)?;
    Ok(())
}

/// Runs every outstanding migration, then tunes the connection and refreshes
/// planner statistics. Calling it on an up-to-date database does nothing but
/// the tuning.
pub fn apply(conn: &mut Connection) -> Result<u32> {
    trace!("trying to get schema version");

    let current = current_version(conn)?;
    let latest = schema::latest_version();

    if current > latest {
        error!(
            "unsupported schema version: got {}, expected at most {}",
            current, latest
        );
        return Err(Error::SchemaVersion {
            found: current,
            supported: latest,
        });
    }

    if current == latest {
        debug!("schema version {} up-to-date, doing nothing", current);
    }

    for migration in schema::MIGRATIONS.iter().filter(|m| m.version > current) {
        run_up(conn, migration)?;
    }

    tune(conn)?;
    conn.execute_batch("PRAGMA optimize; ANALYZE;")?;

    Ok(latest)
}

fn run_up(conn: &mut Connection, migration: &Migration) -> Result<()> {
    info!(
        "applying migration {} ({})",
        migration.version, migration.name
    );

    let schema_error = |source: rusqlite::Error| {
        error!(
            "migration {} ({}) failed: {}",
            migration.version, migration.name, source
        );
        Error::Schema {
            version: migration.version,
            name: migration.name,
            source,
        }
    };

    let tran = conn.transaction().map_err(schema_error)?;

    tran.execute_batch(migration.up).map_err(schema_error)?;
    tran.execute(
        "INSERT INTO SchemaVersion (version, name) VALUES (?, ?)",
        params![migration.version, migration.name],
    )
    .map_err(schema_error)?;

    tran.commit().map_err(schema_error)?;

    Ok(())
}

/// Replays reverse scripts from the current version down to `target`,
/// newest first. Each step commits on its own.
pub fn downgrade(conn: &mut Connection, target: u32) -> Result<u32> {
    let current = current_version(conn)?;

    if target >= current {
        debug!(
            "downgrade target {} not below current {}, doing nothing",
            target, current
        );
        return Ok(current);
    }

    for migration in schema::MIGRATIONS
        .iter()
        .rev()
        .filter(|m| m.version > target && m.version <= current)
    {
        info!(
            "reverting migration {} ({})",
            migration.version, migration.name
        );

        let schema_error = |source: rusqlite::Error| Error::Schema {
            version: migration.version,
            name: migration.name,
            source,
        };

        let tran = conn.transaction().map_err(schema_error)?;

        tran.execute_batch(migration.down).map_err(schema_error)?;
        tran.execute(
            "DELETE FROM SchemaVersion WHERE version = ?",
            params![migration.version],
        )
        .map_err(schema_error)?;

        tran.commit().map_err(schema_error)?;
    }

    current_version(conn)
}
