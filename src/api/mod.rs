//! HTTP handlers for users and roles. Login lives in `auth::api`.

pub mod roles;
pub mod users;

use crate::auth::{error::AuthError, models::Principal};

/// Unknown routes: anonymous callers get the same 401 as any protected
/// route, authenticated callers a 404.
pub async fn fallback(principal: Option<Principal>) -> AuthError {
    match principal {
        Some(_) => AuthError::RouteNotFound,
        None => AuthError::Unauthenticated,
    }
}
