use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Client table size at which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Whether the caller presented a valid bearer token (always true when auth is
/// disabled). Stored as a request extension by [`identify_caller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedCaller(pub bool);

/// API key auth settings used by middleware.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<Vec<u8>>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from `SHOPDB_API_KEYS` (comma-separated bearer tokens).
    ///
    /// In development, empty/missing keys disable auth for local iteration.
    /// In non-development envs, empty/missing keys fail startup.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("SHOPDB_API_KEYS").unwrap_or_default();
        let state = Self::with_keys(raw.split(','));

        if !state.enabled {
            if is_development {
                tracing::warn!(
                    "SHOPDB_API_KEYS not set; admin bearer auth disabled in development environment"
                );
                return Ok(state);
            }

            anyhow::bail!(
                "SHOPDB_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(state)
    }

    /// Auth state accepting exactly `keys`; blank entries are ignored and an
    /// empty set disables auth.
    pub fn with_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut api_keys: Vec<Vec<u8>> = keys
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.as_bytes().to_vec())
            .collect();
        api_keys.sort();
        api_keys.dedup();

        Self {
            enabled: !api_keys.is_empty(),
            api_keys: Arc::new(api_keys),
        }
    }

    fn verifies(&self, headers: &HeaderMap) -> bool {
        !self.enabled
            || extract_bearer_token(headers.get(AUTHORIZATION)).is_some_and(|t| self.allows(t))
    }

    fn allows(&self, token: &str) -> bool {
        // Every key is compared so the scan time does not depend on which one matched.
        self.api_keys
            .iter()
            .fold(subtle::Choice::from(0), |found, key| {
                found | key.as_slice().ct_eq(token.as_bytes())
            })
            .into()
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter keyed by client address.
///
/// Clients are keyed by socket peer unless `x-forwarded-for` is trusted.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    trust_forwarded_for: bool,
    clients: Arc<Mutex<HashMap<String, RateLimitWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            trust_forwarded_for: false,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Key clients on the first `x-forwarded-for` hop. Enable only behind a
    /// reverse proxy that sets the header itself.
    #[must_use]
    pub fn trusting_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Count one request from `client`; returns `false` once the client has
    /// used up its window.
    async fn try_acquire(&self, client: &str) -> bool {
        let mut clients = self.clients.lock().await;
        let now = Instant::now();

        if clients.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started_at) < window);
        }

        let entry = clients.entry(client.to_owned()).or_insert(RateLimitWindow {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return false;
        }

        entry.count += 1;
        true
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

impl MiddlewareErrorBody {
    fn response(status: StatusCode, code: &'static str, message: &'static str) -> Response {
        (
            status,
            Json(Self {
                error: MiddlewareError { code, message },
            }),
        )
            .into_response()
    }
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing Bearer token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => MiddlewareErrorBody::response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Middleware recording whether the caller is authenticated, without rejecting
/// anonymous requests.
pub async fn identify_caller(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let trusted = auth.verifies(req.headers());
    req.extensions_mut().insert(TrustedCaller(trusted));
    next.run(req).await
}

/// Middleware enforcing a fixed request-per-window limit for each client.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(req.headers(), peer, rate_limit.trust_forwarded_for);

    if !rate_limit.try_acquire(&client).await {
        tracing::debug!(client = %client, "rate limit exceeded");
        return MiddlewareErrorBody::response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        );
    }

    next.run(req).await
}

/// Identify the caller by socket peer, or by the first `x-forwarded-for` hop
/// when `trust_forwarded_for` is set.
fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned);

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn auth_state_disables_when_no_keys_in_dev() {
        std::env::remove_var("SHOPDB_API_KEYS");
        let state = AuthState::from_env(true).expect("dev should allow missing keys");
        assert!(!state.enabled);
    }

    #[test]
    fn auth_state_matches_only_configured_keys() {
        let state = AuthState::with_keys(["alpha", " beta ", ""]);
        assert!(state.enabled);
        assert!(state.allows("alpha"));
        assert!(state.allows("beta"));
        assert!(!state.allows("alph"));
        assert!(!state.allows("alpha2"));
        assert!(!state.allows(""));
    }

    #[test]
    fn client_key_uses_peer_unless_forwarded_for_is_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer: SocketAddr = "10.0.0.2:5000".parse().expect("addr");

        assert_eq!(client_key(&headers, Some(peer), false), "10.0.0.2");
        assert_eq!(client_key(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_key(&HeaderMap::new(), Some(peer), true), "10.0.0.2");
        assert_eq!(client_key(&headers, None, false), "unknown");
    }

    #[test]
    fn caller_is_trusted_only_with_a_configured_key() {
        let auth = AuthState::with_keys(["alpha"]);
        let mut headers = HeaderMap::new();
        assert!(!auth.verifies(&headers));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert!(!auth.verifies(&headers));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer alpha"));
        assert!(auth.verifies(&headers));

        let open = AuthState::with_keys(std::iter::empty::<&str>());
        assert!(open.verifies(&HeaderMap::new()));
    }

    #[tokio::test]
    async fn rate_limit_windows_are_per_client() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));

        assert!(limiter.try_acquire("a").await);
        assert!(limiter.try_acquire("a").await);
        assert!(!limiter.try_acquire("a").await);
        assert!(limiter.try_acquire("b").await);
    }

    #[tokio::test]
    async fn rate_limit_window_resets_after_period() {
        let limiter = RateLimitState::new(1, Duration::from_millis(20));

        assert!(limiter.try_acquire("a").await);
        assert!(!limiter.try_acquire("a").await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.try_acquire("a").await);
    }
}
