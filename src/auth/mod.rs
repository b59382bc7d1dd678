//! Authentication Module
//! Mission: Credentials in, signed bearer tokens out, authorities enforced per route

pub mod api;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod provider;
pub mod validation;

pub use api::AuthState;
pub use error::AuthError;
pub use jwt::TokenCodec;
pub use middleware::token_filter;
pub use provider::AuthenticationProvider;
