//! Ambient HTTP middleware: request IDs, security headers, CORS, structured
//! request logging, host admission (C2), and caller resolution (C1).
//!
//! Generic pieces (`request_id_middleware`, `security_headers_middleware`,
//! `cors_layer`, `request_logging_middleware`) keep the teacher's shape
//! unchanged. Authentication is no longer JWT-manager-based: it resolves a
//! [`crate::identity::Caller`] via [`crate::identity::resolve_caller`] and
//! inserts it into request extensions for handlers to pull out.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::host_admission::AdmittedHost;
use crate::identity::{resolve_caller, Caller};

use super::state::AppState;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());
    let mut response = next.run(request).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == "session").then_some(value)
    })
}

/// Runs the host-admission filter (C2) first and inserts the
/// [`AdmittedHost`] into extensions, then resolves the caller (C1) from
/// whichever credential the request carries and inserts [`Caller`].
/// Handlers decide for themselves whether an [`Caller::Anonymous`] caller is
/// acceptable — this middleware never rejects a request on its own.
pub async fn resolve_request_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, crate::error::AppError> {
    let host_header = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let admitted = state.host_admission.admit(&host_header).await?;
    request.extensions_mut().insert(admitted);

    let bearer = extract_bearer_token(request.headers()).map(str::to_string);
    let session_cookie = extract_session_cookie(request.headers()).map(str::to_string);
    let caller = resolve_caller(
        &state.pool,
        bearer.as_deref(),
        session_cookie.as_deref(),
        &state.config.access_token_secret,
    )
    .await?;
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Extension helper: the workspace behind a custom-domain request, if any.
/// Main-domain requests carry no implicit workspace — the route itself
/// names one (e.g. `/teams/{team_key}/...`).
pub fn admitted_workspace(admitted: &AdmittedHost) -> Option<&crate::workspace::Workspace> {
    match admitted {
        AdmittedHost::MainDomain => None,
        AdmittedHost::CustomDomain(workspace) => Some(workspace),
    }
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<String>()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(request_id = %request_id, method = %method, uri = %uri, "incoming request");
    let response = next.run(request).await;
    let duration = start.elapsed();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = %duration.as_millis(),
        "request completed"
    );
    response
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600))
}

pub fn cors_layer_with_origins(origins: Vec<String>) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .max_age(Duration::from_secs(3600))
        .allow_credentials(true)
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert("Referrer-Policy", HeaderValue::from_static("strict-origin-when-cross-origin"));
    response
}

/// Caps request bodies uploaded as SBOMs/documents (§6 sets no explicit
/// limit; this mirrors the teacher's generic 10 MiB ceiling).
pub async fn request_size_limit_middleware(
    request: Request,
    next: Next,
) -> Result<Response, crate::error::AppError> {
    const MAX_REQUEST_SIZE: u64 = 10 * 1024 * 1024;
    if let Some(length) = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        if length > MAX_REQUEST_SIZE {
            return Err(crate::error::AppError::InvalidInput(format!(
                "request body of {length} bytes exceeds the {MAX_REQUEST_SIZE} byte limit"
            )));
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn extracts_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=xyz; other=1"));
        assert_eq!(extract_session_cookie(&headers), Some("xyz"));
    }

    #[test]
    fn missing_auth_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
