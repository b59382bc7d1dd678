//! Role Endpoints

use crate::auth::{error::AuthError, models::RoleResponse, AuthState};
use axum::{extract::State, Json};

/// List roles with their authorities - GET /api/roles (READ)
pub async fn list_roles(
    State(state): State<AuthState>,
) -> Result<Json<Vec<RoleResponse>>, AuthError> {
    let roles = state.role_store.list_roles()?;

    let mut response = Vec::with_capacity(roles.len());
    for role in roles {
        let authorities = state.role_store.authorities_of(&role.id)?;
        response.push(RoleResponse {
            id: role.id.to_string(),
            name: role.name,
            authorities: authorities.into_iter().collect(),
        });
    }

    Ok(Json(response))
}
