//! Authentication Models
//! Mission: Define user, role, authority and principal data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Authorities seeded as reference data.
pub const AUTHORITY_READ: &str = "READ";
pub const AUTHORITY_WRITE: &str = "WRITE";
pub const AUTHORITY_DELETE: &str = "DELETE";
pub const AUTHORITY_ADMIN: &str = "ADMIN";

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

/// Atomic permission string. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub id: Uuid,
    pub name: String,
}

/// Named bundle of authorities.
///
/// The role owns its authority associations. Users point at a role through
/// `User::role_id`; the reverse lookup is a query, not a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub authority_ids: BTreeSet<Uuid>,
}

/// Authenticated identity attached to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub authorities: BTreeSet<String>,
}

impl Principal {
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user_id)
    pub username: String,
    pub authorities: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64, // seconds until expiration
    pub user: PrincipalResponse,
}

/// Principal as seen by the caller
#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub id: String,
    pub username: String,
    pub authorities: Vec<String>,
}

impl PrincipalResponse {
    pub fn from_principal(principal: &Principal) -> Self {
        Self {
            id: principal.id.to_string(),
            username: principal.username.clone(),
            authorities: principal.authorities.iter().cloned().collect(),
        }
    }
}

/// Sign-up request body
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Role assignment request body
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User, role: Option<&Role>) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            username: user.username.clone(),
            role: role.map(|r| r.name.clone()),
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

/// Role listing entry
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: String,
    pub name: String,
    pub authorities: Vec<String>,
}
