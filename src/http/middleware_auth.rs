//! Bearer authentication for protected endpoints.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use http::request::Parts;
use std::sync::Arc;

use crate::engine::OAuthEngine;
use crate::oauth::resource_server::bearer_credential;
use crate::oauth::types::{OAuthErrorResponse, Principal};

/// Authenticated principal extractor for protected endpoints
///
/// Reads `Authorization: Bearer <token>`, falling back to the `access_token`
/// query parameter, and runs it through the validation engine. Every rejection produces the same `401` response; the reason is only
/// logged.
///
/// ```ignore
/// async fn protected(ExtractedAuth(principal): ExtractedAuth) -> String {
///     format!("hello {}", principal.client_id)
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ExtractedAuth(pub Principal);

fn invalid_token_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer error=\"invalid_token\""),
        )],
        axum::Json(OAuthErrorResponse::invalid_token()),
    )
        .into_response()
}

impl<S> FromRequestParts<S> for ExtractedAuth
where
    Arc<OAuthEngine>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let engine = Arc::<OAuthEngine>::from_ref(state);

        let query_token = parts.uri.query().and_then(access_token_parameter);
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_credential)
            .or(query_token.as_deref());

        engine
            .validate_request(bearer)
            .await
            .map(ExtractedAuth)
            .map_err(|_| invalid_token_response())
    }
}

/// The `access_token` query parameter (RFC 6750 Section 2.3).
fn access_token_parameter(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
}

/// Handles GET /protected
pub async fn handle_protected(ExtractedAuth(principal): ExtractedAuth) -> &'static str {
    tracing::debug!(client_id = %principal.client_id, "protected resource served");
    "I'm protected 👋!"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_parameter() {
        assert_eq!(
            access_token_parameter("access_token=abc&x=1"),
            Some("abc".to_string())
        );
        assert_eq!(
            access_token_parameter("x=1&access_token=a%2Bb"),
            Some("a+b".to_string())
        );
        assert_eq!(access_token_parameter("token=abc"), None);
        assert_eq!(access_token_parameter(""), None);
    }
}
