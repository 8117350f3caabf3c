//! Request guards wrapped around the API routes, outermost first:
//!
//! 1. [`rate_limit`]: counts the request against the read or write limiter,
//!    keyed by `<method>:<client ip>`, and rejects it with 429 when exhausted.
//!    The client ip is the socket peer unless `limits.trust_proxy_headers` is
//!    set, since clients can send any forwarding header they like.
//! 2. [`cache`]: serves fresh cached GET responses and stores new 2xx ones,
//!    unless a write invalidated their tags while the handler ran.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bookaimark::cache::{cache_key, CachedResponse};
use bookaimark::ratelimit::{RateLimitExceeded, RateLimitStatus};

use crate::response::ApiError;
use crate::routes::UserQuery;
use crate::state::{user_tag, SharedState};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub async fn rate_limit(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let limiter = if is_read(&method) {
        &state.read_limiter
    } else {
        &state.write_limiter
    };
    let key = format!("{}:{}", method, client_ip(&request, state.trust_proxy_headers));

    match limiter.check(&key) {
        Ok(status) => {
            let mut response = next.run(request).await;
            append_rate_limit_headers(response.headers_mut(), &status);
            response
        }
        Err(exceeded) => too_many_requests(&exceeded),
    }
}

pub async fn cache(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }
    let Some(resource) = resource_tag(request.uri().path()) else {
        return next.run(request).await;
    };

    let headers = request.headers();
    let key = cache_key(
        request.method().as_str(),
        &request.uri().to_string(),
        header_str(headers, AUTHORIZATION.as_str()),
        header_str(headers, ACCEPT.as_str()),
    );

    if let Some(hit) = state.cache.get(&key) {
        tracing::debug!(key = %key, "cache hit");
        return cached_response(hit);
    }

    let mut tags = vec![resource.to_string()];
    if let Some(user_id) = query_user_id(request.uri()) {
        tags.push(user_tag(&user_id));
    }
    let since = state.cache.generations(&tags);

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => return ApiError::internal(format!("failed to buffer response: {err}")).into_response(),
    };
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let policy = state.cache_policy;
    state.cache.insert(
        key,
        CachedResponse {
            status: parts.status.as_u16(),
            content_type,
            body: bytes.to_vec(),
        },
        policy.ttl,
        &since,
        policy.compression,
    );

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static("MISS"));
    response
}

/// First path segment under `/api/`, used as the cache tag of a resource.
pub fn resource_tag(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/api/")?;
    let segment = rest.split('/').next()?;
    (!segment.is_empty()).then_some(segment)
}

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// The socket peer, or the forwarding headers first when they are trusted.
fn client_ip(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').map(str::trim).find(|ip| !ip.is_empty()));
    let real = header_str(headers, "x-real-ip").map(str::trim).filter(|ip| !ip.is_empty());
    forwarded.or(real).map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// The percent-decoded `user_id` query parameter, as handlers see it.
fn query_user_id(uri: &Uri) -> Option<String> {
    let Query(params) = Query::<UserQuery>::try_from_uri(uri).ok()?;
    params.user_id.filter(|user_id| !user_id.is_empty())
}

fn cached_response(hit: CachedResponse) -> Response {
    let status = StatusCode::from_u16(hit.status).unwrap_or(StatusCode::OK);
    let mut response = (status, hit.body).into_response();
    let headers = response.headers_mut();
    if let Some(content_type) = hit.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
        headers.insert(CONTENT_TYPE, content_type);
    }
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn append_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    if status.limit == 0 {
        return;
    }
    let reset = unix_now() + status.reset_after.as_secs();
    insert_number(headers, X_RATELIMIT_LIMIT, u64::from(status.limit));
    insert_number(headers, X_RATELIMIT_REMAINING, u64::from(status.remaining));
    insert_number(headers, X_RATELIMIT_RESET, reset);
}

fn too_many_requests(exceeded: &RateLimitExceeded) -> Response {
    let retry_after = exceeded.retry_after_secs();
    let mut response = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
        .with_code("RATE_LIMITED")
        .with_details(serde_json::json!({
            "retry_after_seconds": retry_after,
            "limit": exceeded.limit,
            "window_seconds": exceeded.window.as_secs(),
        }))
        .into_response();
    let headers = response.headers_mut();
    insert_number(headers, X_RATELIMIT_LIMIT, u64::from(exceeded.limit));
    insert_number(headers, X_RATELIMIT_REMAINING, 0);
    insert_number(headers, X_RATELIMIT_RESET, unix_now() + retry_after);
    insert_number(headers, RETRY_AFTER, retry_after);
    response
}

fn insert_number(headers: &mut HeaderMap, name: HeaderName, value: u64) {
    headers.insert(name, HeaderValue::from(value));
}
