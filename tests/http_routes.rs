//! HTTP adapter tests driving the router with `tower::ServiceExt::oneshot`.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use base64::{Engine, prelude::*};
use portcullis::{
    config::Config,
    engine::OAuthEngine,
    http::{AppState, build_router},
    storage::MemoryOAuthStorage,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

fn app() -> Router {
    let config = Config::from_lookup(|_| None).unwrap();
    let engine = Arc::new(OAuthEngine::new(
        &config,
        Arc::new(MemoryOAuthStorage::new()),
    ));
    build_router(AppState::new(engine))
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn register(app: &Router) -> (String, String) {
    let response = send(app, Request::get("/credentials").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    (
        json["client_id"].as_str().unwrap().to_string(),
        json["client_secret"].as_str().unwrap().to_string(),
    )
}

fn form_token_request(body: String) -> Request<Body> {
    Request::post("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_index_is_public() {
    let app = app();
    let response = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Hello, I'm not protected 👋!");
}

#[tokio::test]
async fn test_client_credentials_over_query_string() {
    let app = app();
    let (client_id, client_secret) = register(&app).await;
    assert_eq!(client_id.len(), 8);

    let uri = format!(
        "/token?grant_type=client_credentials&client_id={}&client_secret={}&scope=",
        client_id, client_secret
    );
    let response = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );

    let json = body_json(response).await;
    assert_eq!(json["token_type"], "bearer");
    assert_eq!(json["expires_in"], 7200);
    let access_token = json["access_token"].as_str().unwrap().to_string();

    let response = send(
        &app,
        Request::get("/protected")
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "I'm protected 👋!");
}

#[tokio::test]
async fn test_client_credentials_with_basic_auth() {
    let app = app();
    let (client_id, client_secret) = register(&app).await;

    let encoded = BASE64_STANDARD.encode(format!("{}:{}", client_id, client_secret));
    let request = Request::post("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::AUTHORIZATION, format!("Basic {}", encoded))
        .body(Body::from("grant_type=client_credentials"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_errors() {
    let app = app();
    let (client_id, _) = register(&app).await;

    let response = send(
        &app,
        form_token_request(format!(
            "grant_type=client_credentials&client_id={}&client_secret=wrong",
            client_id
        )),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");

    let response = send(
        &app,
        form_token_request(format!("grant_type=password&client_id={}", client_id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");

    let response = send(&app, form_token_request(String::new())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorization_code_over_http() {
    let app = app();
    let (client_id, client_secret) = register(&app).await;

    let uri = format!(
        "/authorize?response_type=code&client_id={}&redirect_uri=http%3A%2F%2Flocalhost%3A9094%2Foauth2&state=xyz",
        client_id
    );
    let response = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    let location = Url::parse(location).unwrap();
    assert_eq!(location.path(), "/oauth2");
    let pairs: std::collections::HashMap<String, String> =
        location.query_pairs().into_owned().collect();
    assert_eq!(pairs["state"], "xyz");
    let code = pairs["code"].clone();

    // Wrong redirect domain is refused
    let body = format!(
        "grant_type=authorization_code&code={}&redirect_uri=http%3A%2F%2Fexample.org%3A9094%2Foauth2&client_id={}&client_secret={}",
        code, client_id, client_secret
    );
    let response = send(&app, form_token_request(body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_authorize_rejects_foreign_redirect() {
    let app = app();
    let (client_id, _) = register(&app).await;

    let uri = format!(
        "/authorize?client_id={}&redirect_uri=https%3A%2F%2Fattacker.example%2Fcb",
        client_id
    );
    let response = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_protected_rejections_share_one_shape() {
    let app = app();

    let missing = Request::get("/protected").body(Body::empty()).unwrap();
    let malformed = Request::get("/protected")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let unknown = Request::get("/protected")
        .header(header::AUTHORIZATION, format!("Bearer {}", "Z".repeat(43)))
        .body(Body::empty())
        .unwrap();

    for request in [missing, malformed, unknown] {
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer error=\"invalid_token\""
        );
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "invalid_token"})
        );
    }
}

#[tokio::test]
async fn test_protected_accepts_access_token_parameter() {
    let app = app();
    let (client_id, client_secret) = register(&app).await;

    let response = send(
        &app,
        form_token_request(format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            client_id, client_secret
        )),
    )
    .await;
    let access_token = body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/protected?access_token={}", access_token);
    let response = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "I'm protected 👋!");

    let corrupted = format!("/protected?access_token={}", &access_token[1..]);
    let response = send(&app, Request::get(corrupted).body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "invalid_token"})
    );

    let reversed: String = access_token.chars().rev().collect();
    let response = send(
        &app,
        Request::get(format!("/protected?access_token={}", reversed))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
