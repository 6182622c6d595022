use super::versioned_schema::{VersionedSchema, BASE_DB_VERSION};
use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// An embedded SQLite database opened through an ordered chain of candidate
/// paths. The first candidate whose directory can be created and whose file
/// opens read-write wins; all candidates failing is a fatal error.
pub struct EmbeddedDb {
    conn: Mutex<Connection>,
    active_path: Mutex<PathBuf>,
    candidates: Vec<PathBuf>,
    schemas: &'static [VersionedSchema],
}

impl EmbeddedDb {
    pub fn open(candidates: Vec<PathBuf>, schemas: &'static [VersionedSchema]) -> Result<Self> {
        let (conn, path) = open_first_available(&candidates, schemas)?;
        info!("Opened database at {}", path.display());
        Ok(EmbeddedDb {
            conn: Mutex::new(conn),
            active_path: Mutex::new(path),
            candidates,
            schemas,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.active_path.lock().unwrap().clone()
    }

    pub fn with_read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Runs a mutating operation. If it fails because the open handle has
    /// become read-only (e.g. the filesystem was remounted read-only), the
    /// database is reopened starting from the fallback candidates and the
    /// operation retried exactly once; a second failure propagates.
    pub fn with_write<T>(&self, f: impl Fn(&mut Connection) -> Result<T>) -> Result<T> {
        {
            let mut conn = self.conn.lock().unwrap();
            match f(&mut conn) {
                Err(err) if is_readonly_error(&err) => {
                    warn!(
                        "Write hit a read-only database, reopening via fallback paths: {:#}",
                        err
                    );
                }
                other => return other,
            }
        }
        self.reopen_preferring_fallback()?;
        let mut conn = self.conn.lock().unwrap();
        f(&mut conn)
    }

    fn reopen_preferring_fallback(&self) -> Result<()> {
        let mut rotated: Vec<PathBuf> = self.candidates.iter().skip(1).cloned().collect();
        if let Some(first) = self.candidates.first() {
            rotated.push(first.clone());
        }
        let (conn, path) = open_first_available(&rotated, self.schemas)?;
        info!("Reopened database at {}", path.display());
        *self.conn.lock().unwrap() = conn;
        *self.active_path.lock().unwrap() = path;
        Ok(())
    }
}

fn open_first_available(
    candidates: &[PathBuf],
    schemas: &'static [VersionedSchema],
) -> Result<(Connection, PathBuf)> {
    let mut errors: Vec<String> = Vec::new();
    for candidate in candidates {
        match open_at(candidate, schemas) {
            Ok(conn) => return Ok((conn, candidate.clone())),
            Err(err) => {
                debug!("Candidate {} not usable: {:#}", candidate.display(), err);
                errors.push(format!("{}: {:#}", candidate.display(), err));
            }
        }
    }
    bail!(
        "Failed to open the database at any candidate path: {}",
        errors.join(" | ")
    )
}

fn open_at(path: &Path, schemas: &'static [VersionedSchema]) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let conn = if path.exists() {
        Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        let conn = Connection::open(path)?;
        schemas
            .last()
            .context("No schema versions defined")?
            .create(&conn)?;
        conn
    };
    conn.execute("PRAGMA foreign_keys = ON;", [])?;

    let db_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<_, i64>(0))
        .context("Failed to read database version")?
        - BASE_DB_VERSION as i64;
    if db_version < 0 {
        bail!(
            "File {} does not look like a player database (user_version below base)",
            path.display()
        );
    }
    let version = db_version as usize;
    if version >= schemas.len() {
        bail!("Database version {} is too new", version);
    }
    schemas[version].validate(&conn)?;
    migrate_if_needed(&conn, version, schemas)?;

    Ok(conn)
}

fn migrate_if_needed(
    conn: &Connection,
    version: usize,
    schemas: &'static [VersionedSchema],
) -> Result<()> {
    let mut latest = version;
    for schema in schemas.iter().skip(version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!("Migrating database from version {} to {}", latest, schema.version);
            migration_fn(conn)?;
            latest = schema.version;
        }
    }
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
        [],
    )?;
    Ok(())
}

fn is_readonly_error(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(rusqlite::Error::SqliteFailure(ffi_err, message)) =
            cause.downcast_ref::<rusqlite::Error>()
        {
            if ffi_err.code == rusqlite::ErrorCode::ReadOnly {
                return true;
            }
            if message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains("readonly"))
            {
                return true;
            }
        }
    }
    false
}
