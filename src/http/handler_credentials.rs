//! Handles GET /credentials - registers a client and returns its credentials once

use axum::{Json, extract::State, http::header, response::IntoResponse, response::Response};
use std::sync::Arc;

use super::handler_oauth::oauth_error_response;
use crate::engine::OAuthEngine;

pub async fn handle_credentials(State(engine): State<Arc<OAuthEngine>>) -> Response {
    match engine.register_client().await {
        Ok(registration) => (
            [(header::CACHE_CONTROL, "no-store")],
            Json(registration),
        )
            .into_response(),
        Err(err) => oauth_error_response(err),
    }
}
