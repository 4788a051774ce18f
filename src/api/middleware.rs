use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::api::state::AppState;
use crate::authz::Principal;
use crate::crypto::TokenError;
use crate::error::AppError;

/// Identity resolved by [`require_auth`], available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Principal for AuthUser {
    fn principal_id(&self) -> &str {
        &self.id
    }

    fn principal_email(&self) -> &str {
        &self.email
    }
}

/// Extracts `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Authentication gateway for protected routes.
///
/// Every failure (no header, bad scheme, bad signature, expiry, deleted
/// account) becomes the same 401; the precise reason is only logged.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = bearer_token(request.headers()) else {
        tracing::debug!(path = %request.uri().path(), "missing bearer token");
        return Err(AppError::Unauthenticated);
    };

    let account_id = state.tokens.verify(token).map_err(|e| {
        match e {
            TokenError::Expired => tracing::debug!("rejected expired token"),
            TokenError::Invalid => tracing::debug!("rejected invalid token"),
        }
        AppError::Unauthenticated
    })?;

    let account = state
        .credentials
        .find(&account_id)
        .await?
        .ok_or_else(|| {
            tracing::debug!(%account_id, "token subject no longer exists");
            AppError::Unauthenticated
        })?;

    request.extensions_mut().insert(AuthUser {
        id: account.id,
        name: account.name,
        email: account.email,
    });

    Ok(next.run(request).await)
}

/// Simple in-memory rate limiter
/// Tracks requests per IP address and enforces limits
#[derive(Clone)]
pub struct RateLimiter {
    // IP -> (count, window_start)
    state: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let entry = state.entry(ip).or_insert((0, now));

        // Reset if window expired
        if now.duration_since(entry.1) > self.window {
            *entry = (1, now);
            return true;
        }

        if entry.0 < self.max_requests {
            entry.0 += 1;
            true
        } else {
            false
        }
    }

    /// Periodic cleanup of old entries
    pub async fn cleanup(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.retain(|_, (_, time)| now.duration_since(*time) <= self.window * 2);
    }

    pub async fn tracked(&self) -> usize {
        self.state.lock().await.len()
    }
}

/// Rate limiting for the credential endpoints.
pub async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if !limiter.check(ip).await {
        tracing::warn!(%ip, "rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
