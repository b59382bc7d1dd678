//! Application Assembly
//! Mission: Wire stores, codec and handlers into one router

use crate::api;
use crate::auth::{
    self,
    jwt::TokenCodec,
    middleware::{require_authenticated, require_authority, token_filter},
    models::{AUTHORITY_ADMIN, AUTHORITY_DELETE, AUTHORITY_READ},
    password::PasswordHasher,
    validation::{validate_email, validate_password, validate_username},
    AuthState,
};
use crate::config::Config;
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitLayer};
use crate::store::{users::NewUser, Database, RoleStore, UserStore};
use anyhow::{anyhow, ensure, Context, Result};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use rand::Rng;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Build the HTTP router.
///
/// `POST /api/users` and `POST /api/authenticate` are open; every other route
/// needs a verified principal. Layers run outermost first: request logging,
/// CORS, the token filter, then the per-route guards.
pub fn router(state: AuthState, login_limiter: Option<RateLimitLayer>) -> Router {
    let mut login = post(auth::api::login);
    if let Some(limiter) = login_limiter {
        login = login.route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    let users = get(api::users::list_users)
        .route_layer(middleware::from_fn(require_authority(AUTHORITY_READ)))
        .merge(post(api::users::create_user));

    let user = get(api::users::get_user)
        .route_layer(middleware::from_fn(require_authority(AUTHORITY_READ)))
        .merge(
            put(api::users::update_user)
                .route_layer(middleware::from_fn(require_authenticated)),
        )
        .merge(
            axum::routing::delete(api::users::delete_user)
                .route_layer(middleware::from_fn(require_authority(AUTHORITY_DELETE))),
        );

    Router::new()
        .route("/api/authenticate", login)
        .route("/api/users", users)
        .route(
            "/api/users/me",
            get(auth::api::current_user).route_layer(middleware::from_fn(require_authenticated)),
        )
        .route("/api/users/:id", user)
        .route(
            "/api/users/:id/role",
            put(api::users::assign_role)
                .route_layer(middleware::from_fn(require_authority(AUTHORITY_ADMIN))),
        )
        .route(
            "/api/roles",
            get(api::roles::list_roles)
                .route_layer(middleware::from_fn(require_authority(AUTHORITY_READ))),
        )
        .fallback(api::fallback)
        .layer(middleware::from_fn_with_state(
            state.token_codec.clone(),
            token_filter,
        ))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(request_logging))
        .with_state(state)
}

/// Open the database, seed the default roles and build the shared state.
pub fn build_state(config: &Config) -> Result<AuthState> {
    ensure!(config.token_ttl_hours > 0, "TOKEN_TTL_HOURS must be positive");
    ensure!(config.token_leeway_secs >= 0, "TOKEN_LEEWAY_SECS must not be negative");

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path))?;

    let role_store = Arc::new(RoleStore::new(db.clone()));
    role_store
        .seed_defaults()
        .context("Failed to seed default roles")?;
    let user_store = Arc::new(UserStore::new(db));

    let passwords = Arc::new(PasswordHasher::new(config.bcrypt_cost)?);

    let secret = match &config.jwt_secret {
        Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
        _ => {
            warn!("JWT_SECRET not set; using an ephemeral secret, tokens will not survive a restart");
            rand::thread_rng().gen::<[u8; 32]>().to_vec()
        }
    };
    let token_codec = Arc::new(
        TokenCodec::new(&secret, config.token_ttl_hours)
            .with_context(|| format!("Invalid TOKEN_TTL_HOURS: {}", config.token_ttl_hours))?
            .with_leeway(config.token_leeway_secs),
    );

    info!("Authentication initialized at: {}", config.db_path);

    Ok(AuthState::new(
        user_store,
        role_store,
        passwords,
        token_codec,
        config.default_role.clone(),
    ))
}

/// Create the administrator account for initial setup.
///
/// Does nothing if a user with `email` already exists. If only the username
/// is taken, the admin is skipped with a warning.
pub fn bootstrap_admin(state: &AuthState, email: &str, username: &str, password: &str) -> Result<()> {
    let email = validate_email(email).map_err(|e| anyhow!("Bootstrap admin email: {}", e))?;
    if state.user_store.find_by_email(&email)?.is_some() {
        return Ok(());
    }

    let username =
        validate_username(username).map_err(|e| anyhow!("Bootstrap admin username: {}", e))?;
    if let Some(existing) = state.user_store.find_by_username(&username)? {
        warn!(
            "Bootstrap admin skipped: username '{}' already belongs to {}",
            username, existing.id
        );
        return Ok(());
    }
    validate_password(password).map_err(|e| anyhow!("Bootstrap admin password: {}", e))?;

    let role = state
        .role_store
        .find_role_by_name("admin")?
        .context("The admin role is missing")?;

    let password_hash = state.passwords.hash(password)?;
    let admin = state.user_store.create(NewUser {
        email,
        username,
        password_hash,
        role_id: role.id,
    })?;

    info!("Created bootstrap admin user: {} ({})", admin.username, admin.id);
    Ok(())
}
