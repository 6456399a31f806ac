//! Portcullis: the core of an OAuth 2 authorization server.
//!
//! Registers clients, issues authorization codes, access tokens and refresh
//! tokens, and decides whether a bearer credential grants access. The
//! [`engine::OAuthEngine`] facade ties the pieces together; [`http`] is a thin
//! axum adapter over it.

pub mod config;
pub mod engine;
pub mod errors;
pub mod http;
pub mod oauth;
pub mod storage;
