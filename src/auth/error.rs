//! Authentication Errors
//! Mission: Map every failure kind to a stable status and a `{message}` body

use crate::auth::jwt::TokenError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Shared by every token failure and by missing authentication, so the
/// caller cannot tell which check rejected the request.
pub const AUTHENTICATION_REQUIRED: &str = "Full authentication is required to access this resource";

/// Error body returned by every handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Auth API errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password; deliberately indistinguishable.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("The 'role' must be included appropriately. The user has no effective authorities")]
    EmptyAuthorities,
    #[error("malformed token")]
    MalformedToken,
    #[error("expired token")]
    ExpiredToken,
    #[error("tampered token")]
    TamperedToken,
    #[error("{}", AUTHENTICATION_REQUIRED)]
    Unauthenticated,
    #[error("Access is denied")]
    Forbidden,
    #[error("The email or username is already registered")]
    DuplicateIdentity,
    #[error("The 'username' must not be empty")]
    EmptyUsername,
    #[error("The 'username' must be at most {0} characters")]
    UsernameTooLong(usize),
    #[error("The 'email' does not have a valid format")]
    InvalidEmail,
    #[error("The 'password' must be at least 8 characters and contain an uppercase letter, a lowercase letter and a digit")]
    WeakPassword,
    #[error("The role '{0}' does not exist")]
    UnknownRole(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Cannot delete your own account")]
    CannotDeleteSelf,
    #[error("User not found")]
    UserNotFound,
    #[error("Resource not found")]
    RouteNotFound,
    #[error("Too many requests")]
    RateLimited,
    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MalformedToken
            | AuthError::ExpiredToken
            | AuthError::TamperedToken
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::EmptyAuthorities
            | AuthError::DuplicateIdentity
            | AuthError::EmptyUsername
            | AuthError::UsernameTooLong(_)
            | AuthError::InvalidEmail
            | AuthError::WeakPassword
            | AuthError::UnknownRole(_)
            | AuthError::InvalidRequest(_)
            | AuthError::CannotDeleteSelf => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound | AuthError::RouteNotFound => StatusCode::NOT_FOUND,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Token failures collapse onto one message.
    pub fn message(&self) -> String {
        match self {
            AuthError::MalformedToken | AuthError::ExpiredToken | AuthError::TamperedToken => {
                AUTHENTICATION_REQUIRED.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::MalformedToken,
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Tampered => AuthError::TamperedToken,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { .. } => AuthError::DuplicateIdentity,
            StoreError::NotFound("user") => AuthError::UserNotFound,
            StoreError::NotFound(what) => AuthError::InvalidRequest(format!("{what} not found")),
            StoreError::Database(e) => {
                error!("Store failure: {}", e);
                AuthError::Internal
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            message: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
