//! Application state shared by every handler.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::engine::OAuthEngine;

#[derive(Clone)]
pub struct AppState {
    /// Registry, token store, grant engine and validation engine
    pub engine: Arc<OAuthEngine>,
}

impl AppState {
    pub fn new(engine: Arc<OAuthEngine>) -> Self {
        Self { engine }
    }
}

impl FromRef<AppState> for Arc<OAuthEngine> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.engine.clone()
    }
}
