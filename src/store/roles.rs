//! Role Storage
//! Mission: Roles, authorities and the role-authority join table

use crate::auth::models::{
    Authority, Role, AUTHORITY_ADMIN, AUTHORITY_DELETE, AUTHORITY_READ, AUTHORITY_WRITE,
};
use crate::store::{
    map_constraint, optional_uuid_column, uuid_column, Database, StoreError, StoreResult,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

/// Roles created by `seed_defaults`, with their authorities.
pub const DEFAULT_ROLES: &[(&str, &[&str])] = &[
    ("basic", &[AUTHORITY_READ]),
    ("editor", &[AUTHORITY_READ, AUTHORITY_WRITE]),
    (
        "admin",
        &[AUTHORITY_READ, AUTHORITY_WRITE, AUTHORITY_DELETE, AUTHORITY_ADMIN],
    ),
];

/// Role/Authority model backed by SQLite
#[derive(Debug, Clone)]
pub struct RoleStore {
    db: Database,
}

impl RoleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert the reference authorities and default roles. Safe to run on
    /// every startup.
    pub fn seed_defaults(&self) -> StoreResult<()> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;

        for name in [AUTHORITY_READ, AUTHORITY_WRITE, AUTHORITY_DELETE, AUTHORITY_ADMIN] {
            tx.execute(
                "INSERT OR IGNORE INTO authorities (id, name) VALUES (?1, ?2)",
                params![Uuid::new_v4().to_string(), name],
            )?;
        }

        let mut created = 0;
        for (role, authorities) in DEFAULT_ROLES {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO roles (id, name) VALUES (?1, ?2)",
                params![Uuid::new_v4().to_string(), role],
            )?;
            if inserted == 0 {
                continue;
            }
            created += 1;
            for authority in *authorities {
                tx.execute(
                    "INSERT INTO role_authorities (role_id, authority_id)
                     SELECT r.id, a.id FROM roles r, authorities a
                     WHERE r.name = ?1 AND a.name = ?2",
                    params![role, authority],
                )?;
            }
        }

        tx.commit()?;
        if created > 0 {
            info!("Seeded {} default roles", created);
        }
        Ok(())
    }

    /// Create a new authority
    #[cfg(test)]
    pub(crate) fn create_authority(&self, name: &str) -> StoreResult<Authority> {
        let conn = self.db.connect()?;

        if find_authority(&conn, name)?.is_some() {
            return Err(StoreError::Duplicate { field: "authority" });
        }

        let authority = Authority {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        conn.execute(
            "INSERT INTO authorities (id, name) VALUES (?1, ?2)",
            params![authority.id.to_string(), authority.name],
        )
        .map_err(|e| map_constraint(e, "authority"))?;

        Ok(authority)
    }

    /// Create a role pointing at existing authorities.
    ///
    /// An empty authority list is accepted here; such a role is rejected
    /// when it is assigned to a user.
    pub fn create_role(&self, name: &str, authorities: &[&str]) -> StoreResult<Role> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row("SELECT id FROM roles WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Duplicate { field: "role" });
        }

        let mut authority_ids = BTreeSet::new();
        for authority in authorities {
            let found = find_authority(&tx, authority)?.ok_or(StoreError::NotFound("authority"))?;
            authority_ids.insert(found.id);
        }

        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            authority_ids,
        };

        tx.execute(
            "INSERT INTO roles (id, name) VALUES (?1, ?2)",
            params![role.id.to_string(), role.name],
        )
        .map_err(|e| map_constraint(e, "role"))?;
        for authority_id in &role.authority_ids {
            tx.execute(
                "INSERT INTO role_authorities (role_id, authority_id) VALUES (?1, ?2)",
                params![role.id.to_string(), authority_id.to_string()],
            )?;
        }
        tx.commit()?;

        info!("Created role: {} ({} authorities)", role.name, role.authority_ids.len());
        Ok(role)
    }

    pub fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let conn = self.db.connect()?;
        let id = conn
            .query_row("SELECT id FROM roles WHERE name = ?1", params![name], |row| {
                uuid_column(row, 0)
            })
            .optional()?;

        match id {
            Some(id) => load_role(&conn, id),
            None => Ok(None),
        }
    }

    pub fn get_role(&self, role_id: &Uuid) -> StoreResult<Option<Role>> {
        let conn = self.db.connect()?;
        load_role(&conn, *role_id)
    }

    /// Role assigned to a user, if any
    pub fn role_of(&self, user_id: &Uuid) -> StoreResult<Option<Role>> {
        let conn = self.db.connect()?;
        let role_id = conn
            .query_row(
                "SELECT role_id FROM users WHERE id = ?1",
                params![user_id.to_string()],
                |row| optional_uuid_column(row, 0),
            )
            .optional()?;

        match role_id.flatten() {
            Some(id) => load_role(&conn, id),
            None => Ok(None),
        }
    }

    /// Authority names granted by a role
    pub fn authorities_of(&self, role_id: &Uuid) -> StoreResult<BTreeSet<String>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT a.name FROM authorities a
             JOIN role_authorities ra ON ra.authority_id = a.id
             WHERE ra.role_id = ?1",
        )?;

        let names = stmt
            .query_map(params![role_id.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(names)
    }

    pub fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare("SELECT id FROM roles ORDER BY name")?;
        let ids = stmt
            .query_map([], |row| uuid_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut roles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(role) = load_role(&conn, id)? {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

fn find_authority(conn: &Connection, name: &str) -> StoreResult<Option<Authority>> {
    let authority = conn
        .query_row(
            "SELECT id, name FROM authorities WHERE name = ?1",
            params![name],
            |row| {
                Ok(Authority {
                    id: uuid_column(row, 0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(authority)
}

fn load_role(conn: &Connection, role_id: Uuid) -> StoreResult<Option<Role>> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM roles WHERE id = ?1",
            params![role_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(name) = name else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT authority_id FROM role_authorities WHERE role_id = ?1")?;
    let authority_ids = stmt
        .query_map(params![role_id.to_string()], |row| uuid_column(row, 0))?
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(Some(Role {
        id: role_id,
        name,
        authority_ids,
    }))
}
