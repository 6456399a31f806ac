//! Axum request adapter mapping HTTP onto the engine facade.

pub mod context;
mod handler_credentials;
mod handler_index;
mod handler_oauth;
pub mod middleware_auth;
pub mod server;

pub use context::AppState;
pub use server::build_router;
