//! Sliding-window rate limiting keyed by client IP.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::state::AppState;

pub const AUTH_PATHS: &[&str] = &["/api/v1/auth/login", "/api/v1/auth/forgot-password"];

/// Which request paths a limiter counts.
#[derive(Debug, Clone)]
pub enum Scope {
    Prefix(&'static str),
    Paths(&'static [&'static str]),
}

impl Scope {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix),
            Self::Paths(paths) => paths.iter().any(|p| *p == path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max: u32,
    pub scope: Scope,
    pub message: &'static str,
}

pub struct RateLimiter {
    policy: RateLimitPolicy,
    /// client key -> timestamps of accepted requests inside the window
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Everything under `/api`.
    pub fn general(config: &AppConfig) -> Self {
        Self::new(RateLimitPolicy {
            window: config.rate_limit_window,
            max: config.rate_limit_max,
            scope: Scope::Prefix("/api"),
            message: "Too many requests from this IP, please try again later.",
        })
    }

    /// Login and password-reset requests: 5 per hour.
    pub fn auth() -> Self {
        Self::new(RateLimitPolicy {
            window: Duration::from_secs(60 * 60),
            max: 5,
            scope: Scope::Paths(AUTH_PATHS),
            message: "Too many authentication attempts, please try again after an hour.",
        })
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Record a request for `key` at `now`. Returns false when over the limit.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let hits = windows.entry(key.to_string()).or_default();
        prune(hits, now, self.policy.window);

        if hits.len() >= self.policy.max as usize {
            return false;
        }
        hits.push_back(now);
        true
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop keys whose window has emptied. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, hits| {
            prune(hits, now, self.policy.window);
            !hits.is_empty()
        });
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while hits
        .front()
        .is_some_and(|first| now.saturating_duration_since(*first) >= window)
    {
        hits.pop_front();
    }
}

/// The socket peer, or the first `X-Forwarded-For` hop when behind a trusted proxy.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn enforce(limiter: &RateLimiter, trust_proxy: bool, req: Request, next: Next) -> Response {
    // Preflights never count against a client
    if req.method() == Method::OPTIONS || !limiter.policy().scope.matches(req.uri().path()) {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = client_key(req.headers(), peer, trust_proxy);

    if !limiter.check(&key) {
        warn!("Rate limit exceeded for {} on {}", key, req.uri().path());
        return ApiError::RateLimited(limiter.policy().message.to_string()).into_response();
    }
    next.run(req).await
}

pub async fn general_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(&state.general_limiter, state.config.trust_proxy, req, next).await
}

pub async fn auth_rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    enforce(&state.auth_limiter, state.config.trust_proxy, req, next).await
}
