//! SQLite store: one background writer thread owns the sole write
//! connection; reads run on short-lived connections. WAL keeps readers off
//! the writer's back.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Sender, channel};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::models::{CoreError, CoreResult, ManagerId};
use crate::persistence::MigrationStore;
use crate::sqlite::migrations::{Migration, latest_version, migration, migrations};

const MIGRATIONS_TABLE: &str = "helm_schema_migrations";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type WriteJob = Box<dyn FnOnce(&mut Connection) + Send>;

pub struct SqliteStore {
    path: PathBuf,
    write_tx: Sender<WriteJob>,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                CoreError::storage(format!(
                    "cannot create data directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        let mut connection = open_writer(&path)?;
        configure(&mut connection)?;

        let (write_tx, write_rx) = channel::<WriteJob>();
        std::thread::Builder::new()
            .name("helm-sqlite-writer".to_string())
            .spawn(move || {
                while let Ok(job) = write_rx.recv() {
                    job(&mut connection);
                }
            })
            .map_err(|error| {
                CoreError::storage(format!("cannot start sqlite writer thread: {error}"))
            })?;

        Ok(Self { path, write_tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize a write through the background writer and wait for its
    /// result.
    pub(crate) fn with_write<T>(
        &self,
        op_name: &'static str,
        op: impl FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    ) -> CoreResult<T>
    where
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = channel::<rusqlite::Result<T>>();
        let job: WriteJob = Box::new(move |connection| {
            let _ = reply_tx.send(op(connection));
        });
        self.write_tx
            .send(job)
            .map_err(|_| storage_error(op_name, "sqlite writer thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| storage_error(op_name, "sqlite writer dropped the reply"))?
            .map_err(|error| storage_error(op_name, error.to_string()))
    }

    pub(crate) fn with_read<T>(
        &self,
        op_name: &'static str,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> CoreResult<T> {
        // Reads open ordinary short-lived connections; WAL keeps them from
        // blocking the writer. Writes still funnel through the writer thread.
        let connection = Connection::open(&self.path)
            .map_err(|error| storage_error(op_name, error.to_string()))?;
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|error| storage_error(op_name, error.to_string()))?;
        op(&connection).map_err(|error| storage_error(op_name, error.to_string()))
    }
}

impl MigrationStore for SqliteStore {
    fn schema_version(&self) -> CoreResult<i64> {
        self.with_write("schema_version", |connection| {
            ensure_migrations_table(connection)?;
            read_version(connection)
        })
    }

    fn migrate_to_latest(&self) -> CoreResult<()> {
        self.with_write("migrate_to_latest", |connection| {
            ensure_migrations_table(connection)?;
            let current = read_version(connection)?;
            for version in (current + 1)..=latest_version() {
                let migration =
                    migration(version).expect("migration versions are dense from 1..=latest");
                apply_up(connection, migration)?;
            }
            Ok(())
        })
    }

    fn reset(&self) -> CoreResult<()> {
        self.with_write("reset", |connection| {
            ensure_migrations_table(connection)?;
            let current = read_version(connection)?;
            for version in (1..=current).rev() {
                if let Some(migration) = migration(version) {
                    apply_down(connection, migration)?;
                }
            }
            for version in 1..=latest_version() {
                let migration =
                    migration(version).expect("migration versions are dense from 1..=latest");
                apply_up(connection, migration)?;
            }
            Ok(())
        })
    }
}

fn open_writer(path: &Path) -> CoreResult<Connection> {
    Connection::open(path)
        .map_err(|error| CoreError::storage(format!("cannot open '{}': {error}", path.display())))
}

fn configure(connection: &mut Connection) -> CoreResult<()> {
    connection
        .busy_timeout(BUSY_TIMEOUT)
        .and_then(|_| {
            connection.pragma_update(None, "journal_mode", "WAL")?;
            connection.pragma_update(None, "synchronous", "NORMAL")?;
            connection.pragma_update(None, "foreign_keys", "ON")
        })
        .map_err(|error| CoreError::storage(format!("cannot configure sqlite: {error}")))
}

fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at_unix INTEGER NOT NULL
        );"
    ))
}

fn read_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

fn apply_up(connection: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()
}

fn apply_down(connection: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()
}

pub(crate) fn storage_error(op_name: &str, detail: impl AsRef<str>) -> CoreError {
    CoreError::storage(format!("sqlite '{op_name}': {}", detail.as_ref()))
}

pub(crate) fn parse_manager(raw: &str) -> rusqlite::Result<ManagerId> {
    raw.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown manager id '{raw}'").into(),
        )
    })
}

pub(crate) fn to_flag(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

pub(crate) fn from_flag(value: i64) -> bool {
    value != 0
}

pub(crate) fn unix_from_time(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) fn time_from_unix(seconds: i64) -> SystemTime {
    if seconds <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_secs(seconds as u64)
    }
}

/// Empty or whitespace-only strings are stored as NULL.
pub(crate) fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
