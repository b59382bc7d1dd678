//! Credential Storage
//! Mission: Persist users, roles and authorities in SQLite with explicit
//! uniqueness checks

pub mod roles;
pub mod users;

pub use roles::RoleStore;
pub use users::UserStore;

use rusqlite::{types::Type, Connection};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field (email, username, role or authority name) is taken.
    #[error("duplicate {field}")]
    Duplicate { field: &'static str },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle on the SQLite file shared by the user and role stores.
///
/// Every operation opens its own connection, so the handle is freely
/// cloneable across request tasks.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open the database and create the schema if it is missing
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS authorities (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS role_authorities (
                role_id TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                authority_id TEXT NOT NULL REFERENCES authorities(id),
                PRIMARY KEY (role_id, authority_id)
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role_id TEXT REFERENCES roles(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_role_id ON users(role_id);",
        )?;

        debug!("Schema ready at {}", self.path.display());
        Ok(())
    }
}

/// Read a TEXT column holding a UUID.
pub(crate) fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable TEXT column holding a UUID.
pub(crate) fn optional_uuid_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Uuid::parse_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Map a UNIQUE constraint violation that slipped past the explicit
/// pre-check (two concurrent writers) onto a typed conflict.
pub(crate) fn map_constraint(err: rusqlite::Error, field: &'static str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            StoreError::Duplicate { field }
        }
        _ => StoreError::Database(err),
    }
}
