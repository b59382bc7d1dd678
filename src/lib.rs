//! People Service Library
//!
//! User accounts, password authentication, bearer tokens and role-based
//! authorization. The binary in `main.rs` only parses configuration and
//! serves `app::router`.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod middleware;
pub mod store;
