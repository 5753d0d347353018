//! Tower middleware integrating the limiter with an HTTP server.
//!
//! The middleware translates each inbound request into an `(identifier,
//! tier)` pair, asks the [`RateLimiter`] for a decision, and shapes the
//! response: the three `X-RateLimit-*` headers are set on every response,
//! and limited requests short-circuit with HTTP 429 and a machine-readable
//! JSON body. The decision path is infallible (the orchestrator fails open
//! internally), so rate limiting can never produce a 5xx.
//!
//! # Example
//!
//! ```rust,ignore
//! use rategate::{RateLimitLayer, RequestLimitConfig, IdentifierStrategy};
//!
//! let config = RequestLimitConfig::new()
//!     .with_exempt_path("/health")
//!     .with_path_tier("/api/admin", "admin")
//!     .with_path_tier("/api", "api")
//!     .with_strategy(IdentifierStrategy::Ip);
//!
//! let app = axum::Router::new()
//!     .route("/api/tasks", axum::routing::get(list_tasks))
//!     .layer(RateLimitLayer::new(limiter, config));
//! ```

use crate::application::limiter::RateLimiter;
use crate::domain::decision::{Decision, LimitHeaders};
use crate::domain::tier::DEFAULT_TIER;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::response::Response;
use futures::future::BoxFuture;
use http::header::{HeaderValue, RETRY_AFTER};
use http::{HeaderMap, Request, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// `X-RateLimit-Limit` response header: the tier capacity.
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
/// `X-RateLimit-Remaining` response header: requests left, never negative.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// `X-RateLimit-Reset` response header: Unix seconds until the budget resets.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Machine-readable code carried in the 429 body.
pub const LIMIT_EXCEEDED_CODE: &str = "RATE_LIMIT_EXCEEDED";

/// Request extension carrying the authenticated principal's id.
///
/// Authentication middleware upstream of the limiter inserts this; the
/// [`IdentifierStrategy::User`] strategy reads it.
#[derive(Debug, Clone)]
pub struct PrincipalId(pub String);

/// Custom identifier extraction function.
pub type IdentifierFn = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// How the subject of rate limiting is derived from a request.
///
/// Every strategy falls back to the client IP when its preferred source is
/// absent, so a request always maps to some identifier.
#[derive(Clone)]
pub enum IdentifierStrategy {
    /// `ip:<client address>` from `X-Forwarded-For` or the socket address
    Ip,
    /// `user:<id>` from the [`PrincipalId`] extension, else the client IP
    User,
    /// Custom extraction, else the client IP
    Custom(IdentifierFn),
}

impl std::fmt::Debug for IdentifierStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierStrategy::Ip => f.write_str("Ip"),
            IdentifierStrategy::User => f.write_str("User"),
            IdentifierStrategy::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// Per-route configuration for the middleware.
#[derive(Debug, Clone)]
pub struct RequestLimitConfig {
    exempt_paths: Vec<String>,
    /// Kept sorted longest prefix first so lookup is first-match
    path_tiers: Vec<(String, String)>,
    strategy: IdentifierStrategy,
}

impl Default for RequestLimitConfig {
    fn default() -> Self {
        Self {
            exempt_paths: Vec::new(),
            path_tiers: Vec::new(),
            strategy: IdentifierStrategy::Ip,
        }
    }
}

impl RequestLimitConfig {
    /// Create a config with no exemptions, no path mappings, and IP-based
    /// identifiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip rate limiting entirely for paths starting with this prefix.
    pub fn with_exempt_path(mut self, prefix: impl Into<String>) -> Self {
        self.exempt_paths.push(prefix.into());
        self
    }

    /// Map a path prefix to a tier.
    ///
    /// Lookups match the longest configured prefix, so `/api/admin` wins
    /// over `/api` regardless of registration order.
    pub fn with_path_tier(mut self, prefix: impl Into<String>, tier: impl Into<String>) -> Self {
        self.path_tiers.push((prefix.into(), tier.into()));
        self.path_tiers
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        self
    }

    /// Choose how identifiers are derived.
    pub fn with_strategy(mut self, strategy: IdentifierStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Whether this path skips rate limiting.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Tier for this path, longest prefix first, defaulting to `"default"`.
    pub fn tier_for(&self, path: &str) -> &str {
        self.path_tiers
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, tier)| tier.as_str())
            .unwrap_or(DEFAULT_TIER)
    }
}

/// Tower layer wrapping services with rate limiting.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    config: Arc<RequestLimitConfig>,
}

impl RateLimitLayer {
    /// Create a layer around a limiter and its routing configuration.
    pub fn new(limiter: Arc<RateLimiter>, config: RequestLimitConfig) -> Self {
        Self {
            limiter,
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
            config: Arc::clone(&self.config),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    config: Arc<RequestLimitConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the ready inner service, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = Arc::clone(&self.limiter);
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let path = req.uri().path().to_string();
            if config.is_exempt(&path) {
                return inner.call(req).await;
            }

            let identifier = derive_identifier(&req, &config.strategy);
            let tier = config.tier_for(&path).to_string();
            let (decision, headers) = limiter.headers_for(&identifier, &tier).await;

            if decision.limited {
                tracing::debug!(
                    identifier = %identifier,
                    tier = %tier,
                    path = %path,
                    "request rejected by rate limit"
                );
                return Ok(reject_response(&decision, &headers));
            }

            let mut response = inner.call(req).await?;
            apply_limit_headers(response.headers_mut(), &headers);
            Ok(response)
        })
    }
}

fn derive_identifier(req: &Request<Body>, strategy: &IdentifierStrategy) -> String {
    match strategy {
        IdentifierStrategy::Ip => ip_identifier(req),
        IdentifierStrategy::User => req
            .extensions()
            .get::<PrincipalId>()
            .map(|principal| format!("user:{}", principal.0))
            .unwrap_or_else(|| ip_identifier(req)),
        IdentifierStrategy::Custom(extract) => {
            extract(req).unwrap_or_else(|| ip_identifier(req))
        }
    }
}

fn ip_identifier(req: &Request<Body>) -> String {
    format!("ip:{}", client_address(req))
}

fn client_address(req: &Request<Body>) -> String {
    // Prefer the forwarding header a trusted proxy sets
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_limit_headers(headers: &mut HeaderMap, limit: &LimitHeaders) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(limit.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(limit.reset_secs));
}

fn reject_response(decision: &Decision, headers: &LimitHeaders) -> Response {
    let retry_after = decision.retry_after_secs(chrono::Utc::now().timestamp_millis());
    let body = serde_json::json!({
        "error": {
            "message": "Rate limit exceeded",
            "code": LIMIT_EXCEEDED_CODE,
            "retryAfter": retry_after,
        }
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    apply_limit_headers(response.headers_mut(), headers);
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
