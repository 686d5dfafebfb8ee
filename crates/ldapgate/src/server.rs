//! HTTP boundary for the auth_request pattern
//!
//! One decision per inbound request: the reverse proxy forwards the original
//! request's headers here, we answer 200 (with `x-username` / `x-groups`
//! metadata) or 401. The route is a catch-all because nginx mirrors the
//! original URI onto the subrequest.

use crate::config::Settings;
use crate::resolve::resolve_policy;
use authz_core::{check_authz, AuthzDecision, AuthzRequest, DecisionCache, DirectoryClient};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bruteforce_core::FailureGuard;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

/// Shared per-process state; constructing it in one place makes the
/// single-worker assumption explicit
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: Arc<DecisionCache>,
    pub guard: Arc<FailureGuard>,
    pub client: DirectoryClient,
}

impl AppState {
    pub fn new(settings: Settings, directory: Arc<dyn authz_core::Directory>) -> Self {
        let cache = Arc::new(DecisionCache::new(settings.cache_expiration));
        let guard = Arc::new(FailureGuard::new(settings.guard.clone()));
        Self {
            settings: Arc::new(settings),
            cache,
            guard,
            client: DirectoryClient::new(directory),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .fallback(any(authorize))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK"
}

async fn authorize(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let source = client_addr(&headers, peer.ip());

    let Some((username, password)) = basic_credentials(&headers) else {
        debug!(source = %source, "Missing or malformed Basic credentials");
        return challenge();
    };

    let policy = match resolve_policy(&headers, &state.settings) {
        Ok(policy) => policy,
        Err(e) => {
            error!(username = %username, error = %e, "Policy resolution failed");
            return challenge();
        }
    };

    let request = AuthzRequest {
        username: &username,
        password: &password,
        source,
    };
    match check_authz(&request, &policy, &state.cache, &state.guard, &state.client).await {
        AuthzDecision::Allow {
            username,
            matched_groups,
        } => {
            let mut response = (StatusCode::OK, "ldapgate").into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&username) {
                headers.insert("x-username", value);
            }
            if let Ok(value) = HeaderValue::from_str(&matched_groups.join(",")) {
                headers.insert("x-groups", value);
            }
            scrub(response)
        }
        AuthzDecision::Deny { reason } => {
            debug!(username = %username, %reason, "Request denied");
            challenge()
        }
    }
}

/// 401 with a Basic challenge; the body never explains why
fn challenge() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"ldapgate\""),
    );
    scrub(response)
}

/// Blank the Server header to avoid advertising server properties
fn scrub(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(""));
    response
}

/// Client source address: first X-Forwarded-For hop when present and
/// parseable, else the peer address
fn client_addr(headers: &HeaderMap, peer: IpAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .unwrap_or(peer)
}

/// Parse HTTP Basic credentials from the Authorization header
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = String::from_utf8(BASE64.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_header(username: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded = BASE64.encode(format!("{username}:{password}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[test]
    fn test_basic_credentials_roundtrip() {
        let headers = auth_header("alice", "s3cr3t:with:colons");
        assert_eq!(
            basic_credentials(&headers),
            Some(("alice".to_string(), "s3cr3t:with:colons".to_string()))
        );
    }

    #[test]
    fn test_basic_credentials_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token"),
        );
        assert_eq!(basic_credentials(&headers), None);
    }

    #[test]
    fn test_basic_credentials_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic not-base64!"),
        );
        assert_eq!(basic_credentials(&headers), None);
    }

    #[test]
    fn test_client_addr_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            client_addr(&headers, peer),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_addr_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(client_addr(&headers, peer), peer);
    }
}
