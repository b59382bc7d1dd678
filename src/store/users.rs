//! User Storage
//! Mission: Securely store and manage user accounts with SQLite

use crate::auth::models::User;
use crate::store::{
    map_constraint, optional_uuid_column, uuid_column, Database, StoreError, StoreResult,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, username, password_hash, role_id, created_at, updated_at";

/// Fields for a user about to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role_id: Uuid,
}

/// Fields to overwrite on update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

/// User storage with SQLite backend
#[derive(Debug, Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get user by email, ignoring case
    pub fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let conn = self.db.connect()?;
        find_by_email(&conn, email)
    }

    /// Users other than `exclude_id` holding `email` (case-insensitive)
    pub fn find_conflicting(&self, email: &str, exclude_id: &Uuid) -> StoreResult<Vec<User>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE AND id != ?2"
        ))?;

        let users = stmt
            .query_map(params![email, exclude_id.to_string()], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    pub fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.db.connect()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get(&self, user_id: &Uuid) -> StoreResult<Option<User>> {
        let conn = self.db.connect()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![user_id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Create a new user.
    ///
    /// Email and username uniqueness are checked before the insert; the
    /// UNIQUE constraints only catch concurrent writers.
    pub fn create(&self, new_user: NewUser) -> StoreResult<User> {
        let conn = self.db.connect()?;

        if find_by_email(&conn, &new_user.email)?.is_some() {
            return Err(StoreError::Duplicate { field: "email" });
        }
        if username_taken(&conn, &new_user.username, None)? {
            return Err(StoreError::Duplicate { field: "username" });
        }

        let now = Utc::now().to_rfc3339();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            username: new_user.username,
            password_hash: new_user.password_hash,
            role_id: Some(new_user.role_id),
            created_at: now.clone(),
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO users (id, email, username, password_hash, role_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.email,
                user.username,
                user.password_hash,
                new_user.role_id.to_string(),
                user.created_at,
                user.updated_at,
            ],
        )
        .map_err(|e| map_constraint(e, "email or username"))?;

        info!("Created user: {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Apply changes to an existing user
    pub fn update(&self, user_id: &Uuid, changes: UserChanges) -> StoreResult<User> {
        let mut user = self.get(user_id)?.ok_or(StoreError::NotFound("user"))?;

        if let Some(email) = &changes.email {
            if !self.find_conflicting(email, user_id)?.is_empty() {
                return Err(StoreError::Duplicate { field: "email" });
            }
        }

        let conn = self.db.connect()?;
        if let Some(username) = &changes.username {
            if username_taken(&conn, username, Some(user_id))? {
                return Err(StoreError::Duplicate { field: "username" });
            }
        }

        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        user.updated_at = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE users SET email = ?2, username = ?3, password_hash = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                user.id.to_string(),
                user.email,
                user.username,
                user.password_hash,
                user.updated_at,
            ],
        )
        .map_err(|e| map_constraint(e, "email or username"))?;

        Ok(user)
    }

    /// Point a user at a role
    pub fn assign_role(&self, user_id: &Uuid, role_id: &Uuid) -> StoreResult<()> {
        let conn = self.db.connect()?;
        let rows_affected = conn.execute(
            "UPDATE users SET role_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                user_id.to_string(),
                role_id.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    /// List all users
    pub fn list(&self) -> StoreResult<Vec<User>> {
        let conn = self.db.connect()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at"))?;

        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Delete a user by ID
    pub fn delete(&self, user_id: &Uuid) -> StoreResult<()> {
        let conn = self.db.connect()?;

        let rows_affected = conn.execute(
            "DELETE FROM users WHERE id = ?1",
            params![user_id.to_string()],
        )?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound("user"));
        }

        info!("Deleted user: {}", user_id);
        Ok(())
    }
}

fn find_by_email(conn: &Connection, email: &str) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE LIMIT 1"),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn username_taken(conn: &Connection, username: &str, exclude_id: Option<&Uuid>) -> StoreResult<bool> {
    let exclude = exclude_id.map(|id| id.to_string()).unwrap_or_default();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE username = ?1 AND id != ?2",
        params![username, exclude],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_column(row, 0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        role_id: optional_uuid_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
