//! User Endpoints
//! Mission: Sign-up and user management on top of the credential store

use crate::auth::{
    error::AuthError,
    models::{
        AssignRoleRequest, CreateUserRequest, Principal, Role, UpdateUserRequest, User,
        UserResponse, AUTHORITY_WRITE,
    },
    validation::{validate_email, validate_password, validate_username},
    AuthState,
};
use crate::store::users::{NewUser, UserChanges};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

/// Sign-up - POST /api/users (anonymous)
pub async fn create_user(
    State(state): State<AuthState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), AuthError> {
    let Json(payload) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;

    let email = validate_email(&payload.email)?;
    let username = validate_username(&payload.username)?;
    validate_password(&payload.password)?;

    let role = state
        .role_store
        .find_role_by_name(&state.default_role)?
        .ok_or_else(|| {
            error!("Default role '{}' is missing", state.default_role);
            AuthError::UnknownRole(state.default_role.clone())
        })?;
    ensure_role_grants_authorities(&state, &role)?;

    let password_hash = hash_password(&state, payload.password).await?;

    let user = state.user_store.create(NewUser {
        email,
        username,
        password_hash,
        role_id: role.id,
    })?;

    info!("User registered: {} ({})", user.username, role.name);

    Ok((
        StatusCode::CREATED,
        Json(UserResponse::from_user(&user, Some(&role))),
    ))
}

/// List users - GET /api/users (READ)
pub async fn list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthError> {
    let roles: HashMap<Uuid, Role> = state
        .role_store
        .list_roles()?
        .into_iter()
        .map(|role| (role.id, role))
        .collect();

    let users = state.user_store.list()?;
    let response = users
        .iter()
        .map(|user| {
            let role = user.role_id.and_then(|id| roles.get(&id));
            UserResponse::from_user(user, role)
        })
        .collect();

    Ok(Json(response))
}

/// Get user - GET /api/users/:id (READ)
pub async fn get_user(
    State(state): State<AuthState>,
    user_id: Result<Path<String>, PathRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let user_id = parse_user_id(user_id)?;
    let user = state
        .user_store
        .get(&user_id)?
        .ok_or(AuthError::UserNotFound)?;

    Ok(Json(respond_with_role(&state, &user)?))
}

/// Update user - PUT /api/users/:id (self, or WRITE)
pub async fn update_user(
    State(state): State<AuthState>,
    principal: Principal,
    user_id: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let user_id = parse_user_id(user_id)?;
    if principal.id != user_id && !principal.has_authority(AUTHORITY_WRITE) {
        return Err(AuthError::Forbidden);
    }

    let Json(payload) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;

    let email = payload.email.as_deref().map(validate_email).transpose()?;
    let username = payload
        .username
        .as_deref()
        .map(validate_username)
        .transpose()?;
    let password_hash = match payload.password {
        Some(password) => {
            validate_password(&password)?;
            Some(hash_password(&state, password).await?)
        }
        None => None,
    };

    let user = state.user_store.update(
        &user_id,
        UserChanges {
            email,
            username,
            password_hash,
        },
    )?;

    info!("User updated: {} by {}", user.id, principal.id);
    Ok(Json(respond_with_role(&state, &user)?))
}

/// Delete user - DELETE /api/users/:id (DELETE)
pub async fn delete_user(
    State(state): State<AuthState>,
    principal: Principal,
    user_id: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, AuthError> {
    let user_id = parse_user_id(user_id)?;

    // Don't allow deleting yourself
    if user_id == principal.id {
        return Err(AuthError::CannotDeleteSelf);
    }

    state.user_store.delete(&user_id)?;
    info!("User deleted: {} by {}", user_id, principal.id);

    Ok(StatusCode::NO_CONTENT)
}

/// Assign role - PUT /api/users/:id/role (ADMIN)
pub async fn assign_role(
    State(state): State<AuthState>,
    principal: Principal,
    user_id: Result<Path<String>, PathRejection>,
    payload: Result<Json<AssignRoleRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let user_id = parse_user_id(user_id)?;
    let Json(payload) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;

    let role = state
        .role_store
        .find_role_by_name(payload.role.trim())?
        .ok_or_else(|| AuthError::UnknownRole(payload.role.trim().to_string()))?;
    ensure_role_grants_authorities(&state, &role)?;

    state.user_store.assign_role(&user_id, &role.id)?;
    let user = state
        .user_store
        .get(&user_id)?
        .ok_or(AuthError::UserNotFound)?;

    info!(
        "Role '{}' assigned to {} by {}",
        role.name, user.id, principal.id
    );
    Ok(Json(UserResponse::from_user(&user, Some(&role))))
}

/// A role without authorities cannot be handed to a user.
fn ensure_role_grants_authorities(state: &AuthState, role: &Role) -> Result<(), AuthError> {
    if state.role_store.authorities_of(&role.id)?.is_empty() {
        return Err(AuthError::EmptyAuthorities);
    }
    Ok(())
}

async fn hash_password(state: &AuthState, password: String) -> Result<String, AuthError> {
    let passwords = state.passwords.clone();
    tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(|e| {
            error!("Hashing task failed: {}", e);
            AuthError::Internal
        })?
        .map_err(|e| {
            error!("Password hashing failed: {:#}", e);
            AuthError::Internal
        })
}

fn respond_with_role(state: &AuthState, user: &User) -> Result<UserResponse, AuthError> {
    let role = match user.role_id {
        Some(role_id) => state.role_store.get_role(&role_id)?,
        None => None,
    };
    Ok(UserResponse::from_user(user, role.as_ref()))
}

fn parse_user_id(raw: Result<Path<String>, PathRejection>) -> Result<Uuid, AuthError> {
    let Path(raw) = raw.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    Uuid::parse_str(&raw).map_err(|_| AuthError::InvalidRequest("Invalid user ID format".to_string()))
}
