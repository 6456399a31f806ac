//! Handles GET|POST /token and GET /authorize

use axum::{
    Form, Json,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine, prelude::*};
use std::sync::Arc;
use url::Url;

use crate::engine::OAuthEngine;
use crate::oauth::types::{AuthorizeRequest, OAuthErrorResponse, TokenRequest};

/// Token endpoint. `Form` reads the query string on GET and the body on POST.
pub async fn handle_oauth_token(
    State(engine): State<Arc<OAuthEngine>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let mut request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            return oauth_error_response(OAuthErrorResponse {
                error: "invalid_request".to_string(),
                error_description: Some(rejection.body_text()),
            });
        }
    };

    if let Some((client_id, client_secret)) = extract_client_auth(&headers) {
        request.client_id = Some(client_id);
        request.client_secret = Some(client_secret);
    }

    match engine.issue_token(request).await {
        Ok(response) => (no_store_headers(), Json(response)).into_response(),
        Err(err) => oauth_error_response(err),
    }
}

/// Authorization endpoint. Redirects with the code, or reports the error
/// directly since the redirect target may not be trusted.
pub async fn handle_oauth_authorize(
    State(engine): State<Arc<OAuthEngine>>,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let authorized = match engine.authorize(request).await {
        Ok(authorized) => authorized,
        Err(err) => return oauth_error_response(err),
    };

    let mut location = match Url::parse(&authorized.redirect_uri) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = ?e, "accepted redirect uri failed to parse");
            return oauth_error_response(OAuthErrorResponse {
                error: "server_error".to_string(),
                error_description: None,
            });
        }
    };

    {
        let mut query = location.query_pairs_mut();
        query.append_pair("code", &authorized.code);
        if let Some(state) = &authorized.state {
            query.append_pair("state", state);
        }
    }

    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Client credentials from an HTTP Basic `Authorization` header (RFC 6749 Section 2.3.1)
pub(crate) fn extract_client_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = auth_str.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}

/// Render an OAuth error with the status its code calls for.
pub(crate) fn oauth_error_response(err: OAuthErrorResponse) -> Response {
    let status = match err.error.as_str() {
        "invalid_client" => StatusCode::UNAUTHORIZED,
        "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };

    let mut headers = no_store_headers();
    if status == StatusCode::UNAUTHORIZED {
        headers.insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"portcullis\""),
        );
    }

    (status, headers, Json(err)).into_response()
}

fn no_store_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_client_auth() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_auth(&headers), None);

        let encoded = BASE64_STANDARD.encode("abcd1234:s3cr3t:x");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert_eq!(
            extract_client_auth(&headers),
            Some(("abcd1234".to_string(), "s3cr3t:x".to_string()))
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert_eq!(extract_client_auth(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_client_auth(&headers), None);
    }

    #[test]
    fn test_error_status_mapping() {
        let response = oauth_error_response(OAuthErrorResponse {
            error: "invalid_client".to_string(),
            error_description: None,
        });
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = oauth_error_response(OAuthErrorResponse {
            error: "invalid_grant".to_string(),
            error_description: None,
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );

        let response = oauth_error_response(OAuthErrorResponse {
            error: "server_error".to_string(),
            error_description: None,
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
