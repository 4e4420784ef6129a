//! Axum middleware for authentication, authorization, and rate limiting.
//!
//! One auth scheme covers the whole tool surface: an API key presented as
//! `X-API-Key` or `Authorization: Bearer <key>`, resolved through
//! [`ApiKeyStore`] into a [`Principal`] that handlers pull out of request
//! extensions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ctx_auth::{ApiKeyStore, Principal};
use ctx_core::{AuthError, CtxError};

use crate::error::ApiError;

fn bearer_or_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Token-bucket rate limiter keyed by principal id, reset once per window.
/// A plain `Mutex<HashMap>` rather than a crate like `governor`: a single
/// process-local counter is all the tool surface needs.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self { capacity, window, buckets: Mutex::new(HashMap::new()) }
    }

    fn check(&self, principal_id: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let entry = buckets.entry(principal_id.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        if entry.1 >= self.capacity {
            return false;
        }
        entry.1 += 1;
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(120, Duration::from_secs(60))
    }
}

/// State for [`auth_middleware`], bundling the key store and the rate
/// limiter so both survive as one `axum::middleware::from_fn_with_state`
/// layer rather than two separate `State` extractions racing `FromRef`.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub api_keys: Arc<ApiKeyStore>,
    pub limiter: Arc<RateLimiter>,
    /// When false (`AUTH_REQUIRED=false`, local development only), a
    /// request with no key at all runs as an anonymous human admin instead
    /// of being rejected. A presented key is still validated normally.
    pub required: bool,
}

impl AuthMiddlewareState {
    pub fn new(api_keys: Arc<ApiKeyStore>) -> Self {
        Self { api_keys, limiter: Arc::new(RateLimiter::default()), required: true }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Authenticates the request and injects a [`Principal`] into its
/// extensions. Unauthenticated requests are rejected here rather than left
/// to each handler, so a 401 happens before any tool logic runs.
pub async fn auth_middleware(
    State(mw): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = bearer_or_api_key(request.headers());
    let principal = match presented {
        Some(key) => match mw.api_keys.authenticate(&key) {
            Ok(principal) => principal,
            Err(err) => return ApiError::from(err).into_response(),
        },
        None if !mw.required => Principal {
            id: "anonymous".to_string(),
            role: ctx_core::Role::Admin,
            is_agent: false,
        },
        None => return ApiError::from(CtxError::Auth(AuthError::Unauthenticated)).into_response(),
    };

    if !mw.limiter.check(&principal.id) {
        let err = CtxError::Auth(AuthError::RateLimited { principal_id: principal.id.clone() });
        return ApiError::from(err).into_response();
    }

    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// Extracts the [`Principal`] a prior [`auth_middleware`] layer injected.
/// Handlers depend on this rather than re-authenticating themselves.
pub struct PrincipalExtractor(pub Principal);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for PrincipalExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(PrincipalExtractor)
            .ok_or_else(|| ApiError::from(CtxError::Auth(AuthError::Unauthenticated)))
    }
}
