// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store File Format (§4.H)
//!
//! A record store file is a single SQLite database carrying a `store_meta`
//! header row (magic, schema version, purpose, creation time) plus the
//! tables for one of two schemas:
//!
//! - **Recording** — append-optimized: `records` carries the identifier
//!   columns inline, indexed only on `id`.
//! - **Analysis** — query-optimized: `records` references dictionary tables
//!   (`processes`, `applications`, `writers`, `levels`) by integer id, with
//!   secondary indices on timestamp, process id, and each dictionary
//!   reference.
//!
//! Both schemas share a `texts(id, text)` table keyed by the same id as
//! `records`. Durability mode is a connection-level concern ([`DurabilityMode`])
//! rather than a schema difference: Robust enables the WAL journal and
//! `synchronous=FULL`; Fast disables the journal and fsync.

use logflow_domain::error::PipelineError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Bumped whenever the on-disk row shape changes. §4.H: opening a file older
/// than this but `>= MIN_SUPPORTED_SCHEMA_VERSION` triggers migration;
/// opening anything outside `[MIN, CURRENT]` fails with
/// [`PipelineError::VersionNotSupported`].
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const MIN_SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// A string embedded in `store_meta` identifying this file as a logflow
/// store, independent of SQLite's own file magic (`SQLite format 3\0`),
/// matching §4.H's "header with magic".
const STORE_MAGIC: &str = "logflow-store-v1";

/// Ids are `i64` internally but the store refuses to grow past this count,
/// matching §4.H's `FileTooLarge` gate. Chosen well below `i64::MAX` so the
/// check fires long before any real overflow risk.
pub const MAX_ADDRESSABLE_RECORDS: u64 = 4_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorePurpose {
    Recording,
    Analysis,
}

impl StorePurpose {
    fn as_str(self) -> &'static str {
        match self {
            StorePurpose::Recording => "Recording",
            StorePurpose::Analysis => "Analysis",
        }
    }
}

impl FromStr for StorePurpose {
    type Err = PipelineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Recording" => Ok(StorePurpose::Recording),
            "Analysis" => Ok(StorePurpose::Analysis),
            other => Err(PipelineError::StoreFormatError(format!(
                "unknown store purpose '{other}'"
            ))),
        }
    }
}

/// Robust journals and fsyncs at commit (crash-safe); Fast disables both for
/// higher throughput at the cost of durability (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DurabilityMode {
    #[default]
    Robust,
    Fast,
}

impl FromStr for DurabilityMode {
    type Err = PipelineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "robust" => Ok(DurabilityMode::Robust),
            "fast" => Ok(DurabilityMode::Fast),
            other => Err(PipelineError::config("durability", other.to_string())),
        }
    }
}

/// Header fields read back from `store_meta`.
#[derive(Debug, Clone)]
pub struct StoreHeader {
    pub schema_version: u32,
    pub purpose: StorePurpose,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

fn map_sqlx(err: sqlx::Error) -> PipelineError {
    PipelineError::StoreFormatError(err.to_string())
}

/// Creates the SQLite file if it does not already exist. Idempotent.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), PipelineError> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        debug!(url = database_url, "store file does not exist, creating");
        Sqlite::create_database(database_url).await.map_err(map_sqlx)?;
    }
    Ok(())
}

/// Opens a connection pool with the durability mode's pragmas applied.
/// Robust uses WAL + full fsync; Fast disables the journal and fsync
/// entirely (§4.H: "up to several seconds of writes may be lost on crash").
pub async fn open_pool(path: &str, durability: DurabilityMode) -> Result<SqlitePool, PipelineError> {
    let (journal, sync) = match durability {
        DurabilityMode::Robust => (SqliteJournalMode::Wal, SqliteSynchronous::Full),
        DurabilityMode::Fast => (SqliteJournalMode::Off, SqliteSynchronous::Off),
    };
    let options = SqliteConnectOptions::from_str(path)
        .map_err(map_sqlx)?
        .create_if_missing(true)
        .journal_mode(journal)
        .synchronous(sync)
        .foreign_keys(true);
    SqlitePool::connect_with(options).await.map_err(map_sqlx)
}

/// Opens (creating if absent) a store file, writes or validates its header,
/// and creates the schema tables for `purpose` if this is a fresh file.
///
/// A file that already carries a header must match `purpose` and fall within
/// the supported version range; a version below [`CURRENT_SCHEMA_VERSION`]
/// but at or above [`MIN_SUPPORTED_SCHEMA_VERSION`] is migrated in place
/// (currently a no-op — there is only one shipped version).
pub async fn open_store(path: &str, purpose: StorePurpose, durability: DurabilityMode) -> Result<SqlitePool, PipelineError> {
    let url = format!("sqlite://{path}");
    create_database_if_missing(&url).await?;
    let pool = open_pool(&url, durability).await?;
    ensure_header_table(&pool).await?;

    match read_header(&pool).await? {
        None => {
            write_header(&pool, purpose).await?;
            create_schema_tables(&pool, purpose).await?;
        }
        Some(header) => {
            if header.schema_version > CURRENT_SCHEMA_VERSION {
                return Err(PipelineError::VersionNotSupported {
                    found: header.schema_version,
                    min: MIN_SUPPORTED_SCHEMA_VERSION,
                    max: CURRENT_SCHEMA_VERSION,
                });
            }
            if header.schema_version < MIN_SUPPORTED_SCHEMA_VERSION {
                return Err(PipelineError::VersionNotSupported {
                    found: header.schema_version,
                    min: MIN_SUPPORTED_SCHEMA_VERSION,
                    max: CURRENT_SCHEMA_VERSION,
                });
            }
            if header.purpose != purpose {
                return Err(PipelineError::StoreFormatError(format!(
                    "store at '{path}' was written with purpose {:?} but opened as {:?}",
                    header.purpose, purpose
                )));
            }
            if header.schema_version < CURRENT_SCHEMA_VERSION {
                migrate_in_place(&pool, header.schema_version).await?;
            }
        }
    }
    Ok(pool)
}

async fn ensure_header_table(pool: &SqlitePool) -> Result<(), PipelineError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS store_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            magic TEXT NOT NULL,
            schema_version INTEGER NOT NULL,
            purpose TEXT NOT NULL,
            created_at_utc TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn read_header(pool: &SqlitePool) -> Result<Option<StoreHeader>, PipelineError> {
    let row = sqlx::query("SELECT magic, schema_version, purpose, created_at_utc FROM store_meta WHERE id = 0")
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx)?;
    let Some(row) = row else { return Ok(None) };
    let magic: String = row.get("magic");
    if magic != STORE_MAGIC {
        return Err(PipelineError::StoreFormatError(format!(
            "store header magic mismatch: expected '{STORE_MAGIC}', found '{magic}'"
        )));
    }
    let schema_version: i64 = row.get("schema_version");
    let purpose: String = row.get("purpose");
    let created_at: String = row.get("created_at_utc");
    Ok(Some(StoreHeader {
        schema_version: schema_version as u32,
        purpose: purpose.parse()?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| PipelineError::StoreFormatError(e.to_string()))?
            .with_timezone(&chrono::Utc),
    }))
}

async fn write_header(pool: &SqlitePool, purpose: StorePurpose) -> Result<(), PipelineError> {
    sqlx::query(
        "INSERT INTO store_meta (id, magic, schema_version, purpose, created_at_utc)
         VALUES (0, ?, ?, ?, ?)",
    )
    .bind(STORE_MAGIC)
    .bind(CURRENT_SCHEMA_VERSION as i64)
    .bind(purpose.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

async fn create_schema_tables(pool: &SqlitePool, purpose: StorePurpose) -> Result<(), PipelineError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS texts (
            id INTEGER PRIMARY KEY,
            text TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(map_sqlx)?;

    match purpose {
        StorePurpose::Recording => {
            // Append-optimized: identifier columns inline, index limited to id
            // (the primary key already covers it).
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS records (
                    id INTEGER PRIMARY KEY,
                    timestamp_utc_ticks INTEGER NOT NULL,
                    timezone_offset_ticks INTEGER NOT NULL,
                    high_precision_ts INTEGER NOT NULL,
                    lost_message_count INTEGER,
                    process_id INTEGER NOT NULL,
                    process_name TEXT NOT NULL,
                    application_name TEXT NOT NULL,
                    writer_name TEXT NOT NULL,
                    level_name TEXT NOT NULL,
                    tags TEXT NOT NULL
                )",
            )
            .execute(pool)
            .await
            .map_err(map_sqlx)?;
        }
        StorePurpose::Analysis => {
            for (table, col) in [("processes", "name"), ("applications", "name"), ("writers", "name"), ("levels", "name")] {
                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        {col} TEXT NOT NULL UNIQUE
                    )"
                ))
                .execute(pool)
                .await
                .map_err(map_sqlx)?;
            }
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS records (
                    id INTEGER PRIMARY KEY,
                    timestamp_utc_ticks INTEGER NOT NULL,
                    timezone_offset_ticks INTEGER NOT NULL,
                    high_precision_ts INTEGER NOT NULL,
                    lost_message_count INTEGER,
                    process_id INTEGER NOT NULL,
                    process_ref INTEGER NOT NULL REFERENCES processes(id),
                    application_ref INTEGER NOT NULL REFERENCES applications(id),
                    writer_ref INTEGER NOT NULL REFERENCES writers(id),
                    level_ref INTEGER NOT NULL REFERENCES levels(id),
                    tags TEXT NOT NULL
                )",
            )
            .execute(pool)
            .await
            .map_err(map_sqlx)?;
            for (idx, col) in [
                ("idx_records_timestamp", "timestamp_utc_ticks"),
                ("idx_records_process_id", "process_id"),
                ("idx_records_process_ref", "process_ref"),
                ("idx_records_application_ref", "application_ref"),
                ("idx_records_writer_ref", "writer_ref"),
                ("idx_records_level_ref", "level_ref"),
            ] {
                sqlx::query(&format!("CREATE INDEX IF NOT EXISTS {idx} ON records({col})"))
                    .execute(pool)
                    .await
                    .map_err(map_sqlx)?;
            }
        }
    }
    Ok(())
}

/// There has only ever been one shipped schema version, so this is a no-op
/// placeholder for the in-place migration path §4.H requires before a newer
/// version ships.
async fn migrate_in_place(_pool: &SqlitePool, from_version: u32) -> Result<(), PipelineError> {
    warn!(from_version, to_version = CURRENT_SCHEMA_VERSION, "migrating store in place");
    Ok(())
}

/// Truncates and recreates every table (`messages_only = false`) or just
/// `records`/`texts` (`messages_only = true`). Recreating rather than
/// `DELETE FROM` resets the `AUTOINCREMENT` sequence for dictionary tables
/// and gives `records`/`texts` a fresh id space starting at 0 — recovered
/// from `original_source/` (SPEC_FULL.md).
pub async fn clear_tables(pool: &SqlitePool, purpose: StorePurpose, messages_only: bool) -> Result<(), PipelineError> {
    let mut tx = pool.begin().await.map_err(map_sqlx)?;
    sqlx::query("DELETE FROM records").execute(&mut *tx).await.map_err(map_sqlx)?;
    sqlx::query("DELETE FROM texts").execute(&mut *tx).await.map_err(map_sqlx)?;
    if !messages_only && purpose == StorePurpose::Analysis {
        for table in ["processes", "applications", "writers", "levels"] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await.map_err(map_sqlx)?;
            sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
                .bind(table)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
        }
    }
    tx.commit().await.map_err(map_sqlx)?;
    info!(messages_only, "store cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn temp_path() -> String {
        let f = NamedTempFile::new().unwrap();
        let path = f.path().to_str().unwrap().to_string();
        drop(f);
        path
    }

    #[tokio::test]
    async fn fresh_file_gets_a_header_and_schema() {
        let path = temp_path().await;
        let pool = open_store(&path, StorePurpose::Recording, DurabilityMode::Fast).await.unwrap();
        let header = read_header(&pool).await.unwrap().unwrap();
        assert_eq!(header.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(header.purpose, StorePurpose::Recording);
    }

    #[tokio::test]
    async fn reopening_with_mismatched_purpose_fails() {
        let path = temp_path().await;
        open_store(&path, StorePurpose::Recording, DurabilityMode::Fast).await.unwrap();
        let err = open_store(&path, StorePurpose::Analysis, DurabilityMode::Fast).await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreFormatError(_)));
    }

    #[tokio::test]
    async fn analysis_schema_creates_dictionary_tables() {
        let path = temp_path().await;
        let pool = open_store(&path, StorePurpose::Analysis, DurabilityMode::Fast).await.unwrap();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('processes','applications','writers','levels')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn clear_messages_only_preserves_dictionaries() {
        let path = temp_path().await;
        let pool = open_store(&path, StorePurpose::Analysis, DurabilityMode::Fast).await.unwrap();
        sqlx::query("INSERT INTO writers (name) VALUES ('W')").execute(&pool).await.unwrap();
        clear_tables(&pool, StorePurpose::Analysis, true).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM writers").fetch_one(&pool).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn clear_full_resets_dictionary_ids() {
        let path = temp_path().await;
        let pool = open_store(&path, StorePurpose::Analysis, DurabilityMode::Fast).await.unwrap();
        sqlx::query("INSERT INTO writers (name) VALUES ('W')").execute(&pool).await.unwrap();
        clear_tables(&pool, StorePurpose::Analysis, false).await.unwrap();
        sqlx::query("INSERT INTO writers (name) VALUES ('X')").execute(&pool).await.unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM writers WHERE name = 'X'").fetch_one(&pool).await.unwrap();
        assert_eq!(id, 1);
    }
}
