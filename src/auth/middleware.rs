//! Authentication Middleware
//! Mission: Verify bearer tokens once per request and guard routes by authority

use crate::auth::{
    error::AuthError,
    jwt::{TokenCodec, TokenError},
    models::Principal,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// Set on the request once the token filter has run, so an internal
/// re-dispatch does not verify the token twice.
#[derive(Debug, Clone, Copy)]
struct TokenFilterApplied;

/// Token filter.
///
/// - no bearer token: pass through with an empty security context
/// - valid token: install the `Principal` in the request extensions
/// - expired or malformed token: pass through with an empty context and let
///   the route guard deny
/// - tampered token: reject immediately
pub async fn token_filter(
    State(codec): State<Arc<TokenCodec>>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<TokenFilterApplied>().is_some() {
        return next.run(req).await;
    }
    req.extensions_mut().insert(TokenFilterApplied);

    let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() else {
        return next.run(req).await;
    };

    match codec.verify(bearer.token()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
        }
        Err(TokenError::Tampered) => {
            warn!(
                security_event = "tampered_token",
                method = %req.method(),
                path = %req.uri().path(),
                "Rejected bearer token with invalid signature"
            );
            return AuthError::TamperedToken.into_response();
        }
        Err(e) => {
            debug!(path = %req.uri().path(), "Ignoring unusable bearer token: {}", e);
        }
    }

    next.run(req).await
}

/// Extract principal from request (use after the token filter)
pub fn extract_principal(req: &Request) -> Option<&Principal> {
    req.extensions().get::<Principal>()
}

/// Guard: any authenticated principal
pub async fn require_authenticated(req: Request, next: Next) -> Result<Response, AuthError> {
    if extract_principal(&req).is_none() {
        return Err(AuthError::Unauthenticated);
    }
    Ok(next.run(req).await)
}

/// Guard: an authenticated principal holding `authority`
pub fn require_authority(
    authority: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>>
       + Clone
       + Send
       + Sync
       + 'static {
    move |req: Request, next: Next| Box::pin(check_authority(req, next, authority))
}

async fn check_authority(req: Request, next: Next, authority: &'static str) -> Response {
    let allowed = match extract_principal(&req) {
        None => return AuthError::Unauthenticated.into_response(),
        Some(principal) => principal.has_authority(authority),
    };

    if !allowed {
        debug!(authority, path = %req.uri().path(), "Authority missing");
        return AuthError::Forbidden.into_response();
    }

    next.run(req).await
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}
