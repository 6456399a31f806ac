//! Main router configuration assembling the public, token and protected endpoints.

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{
    context::AppState,
    handler_credentials::handle_credentials,
    handler_index::handle_index,
    handler_oauth::{handle_oauth_authorize, handle_oauth_token},
    middleware_auth::handle_protected,
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ]);

    Router::new()
        .route("/", get(handle_index))
        .route("/credentials", get(handle_credentials))
        .route("/token", get(handle_oauth_token).post(handle_oauth_token))
        .route("/authorize", get(handle_oauth_authorize))
        .route("/protected", get(handle_protected))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::OAuthEngine;
    use crate::storage::MemoryOAuthStorage;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_app_state() -> AppState {
        let config = Config::from_lookup(|_| None).unwrap();
        let engine = Arc::new(OAuthEngine::new(
            &config,
            Arc::new(MemoryOAuthStorage::new()),
        ));
        AppState::new(engine)
    }

    #[tokio::test]
    async fn test_build_router_structure() {
        let router = build_router(create_test_app_state());

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
