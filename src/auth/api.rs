//! Authentication API Endpoints
//! Mission: Provide the login endpoint and shared auth state

use crate::auth::{
    error::AuthError,
    jwt::TokenCodec,
    models::{LoginRequest, LoginResponse, Principal, PrincipalResponse},
    password::PasswordHasher,
    provider::AuthenticationProvider,
};
use crate::store::{RoleStore, UserStore};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub role_store: Arc<RoleStore>,
    pub passwords: Arc<PasswordHasher>,
    pub provider: AuthenticationProvider,
    pub token_codec: Arc<TokenCodec>,
    /// Role assigned on sign-up
    pub default_role: String,
}

impl AuthState {
    pub fn new(
        user_store: Arc<UserStore>,
        role_store: Arc<RoleStore>,
        passwords: Arc<PasswordHasher>,
        token_codec: Arc<TokenCodec>,
        default_role: impl Into<String>,
    ) -> Self {
        let provider =
            AuthenticationProvider::new(user_store.clone(), role_store.clone(), passwords.clone());
        Self {
            user_store,
            role_store,
            passwords,
            provider,
            token_codec,
            default_role: default_role.into(),
        }
    }
}

/// Login endpoint - POST /api/authenticate
pub async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Json(LoginRequest { email, password }) =
        payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    info!("Login attempt: {}", email);

    let provider = state.provider.clone();
    let identifier = email.clone();
    let principal = tokio::task::spawn_blocking(move || provider.authenticate(&identifier, &password))
        .await
        .map_err(|e| {
            error!("Authentication task failed: {}", e);
            AuthError::Internal
        })?
        .map_err(|e| {
            warn!("Failed login attempt: {} ({:?})", email, e);
            e
        })?;

    let issued = state.token_codec.issue(&principal).map_err(|e| {
        error!("Token issue failed for {}: {:#}", principal.id, e);
        AuthError::Internal
    })?;

    info!(
        "Login successful: {} ({})",
        principal.username, principal.id
    );

    Ok(Json(LoginResponse {
        token: issued.token,
        token_type: "Bearer",
        expires_in: issued.expires_in,
        user: PrincipalResponse::from_principal(&principal),
    }))
}

/// Get current principal - GET /api/users/me
/// Built from the verified token alone (no database lookup needed)
pub async fn current_user(principal: Principal) -> Json<PrincipalResponse> {
    Json(PrincipalResponse::from_principal(&principal))
}
