//! End-to-end tests for the auth_request surface with an in-memory directory

use async_trait::async_trait;
use authz_core::{BindOutcome, Directory, DirectoryEntry, DirectoryError, PolicyConfig};
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ldapgate::config::PolicyDefaults;
use ldapgate::{router, AppState, Settings};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// One user (alice/secret) in two groups
struct StaticDirectory;

#[async_trait]
impl Directory for StaticDirectory {
    async fn simple_bind(
        &self,
        _policy: &PolicyConfig,
        dn: &str,
        password: &str,
    ) -> Result<BindOutcome, DirectoryError> {
        if dn == "uid=alice,ou=people,dc=example,dc=com" && password == "secret" {
            Ok(BindOutcome::Success)
        } else {
            Ok(BindOutcome::InvalidCredentials)
        }
    }

    async fn search_subtree(
        &self,
        policy: &PolicyConfig,
        _filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut entry = DirectoryEntry::default();
        entry.attributes.insert(
            policy.group_attribute.clone(),
            vec![
                b"CN=Admins,OU=Groups,DC=example,DC=com".to_vec(),
                b"CN=Users,OU=Groups,DC=example,DC=com".to_vec(),
            ],
        );
        Ok(vec![entry])
    }
}

fn settings() -> Settings {
    Settings {
        defaults: PolicyDefaults {
            endpoint: Some("ldaps://ldap.example.com".to_string()),
            manager_dn: Some("cn=manager,dc=example,dc=com".to_string()),
            manager_password: Some("managerpw".to_string()),
            search_base: Some("dc=example,dc=com".to_string()),
            search_filter: Some("(uid={username})".to_string()),
            bind_dn: Some("uid={username},ou=people,dc=example,dc=com".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn app() -> axum::Router {
    router(AppState::new(settings(), Arc::new(StaticDirectory)))
}

fn request(path: &str, auth: Option<(&str, &str)>, extra: &[(&str, &str)]) -> Request<Body> {
    let peer: SocketAddr = "127.0.0.1:45000".parse().unwrap();
    let mut builder = Request::builder().uri(path).extension(ConnectInfo(peer));
    if let Some((username, password)) = auth {
        let encoded = BASE64.encode(format!("{username}:{password}"));
        builder = builder.header(header::AUTHORIZATION, format!("Basic {encoded}"));
    }
    for (name, value) in extra {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_healthz_needs_no_credentials() {
    let response = app().oneshot(request("/healthz", None, &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_credentials_get_a_challenge() {
    let response = app().oneshot(request("/", None, &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_valid_credentials_allow_with_metadata() {
    let response = app()
        .oneshot(request("/protected/path", Some(("alice", "secret")), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-username"], "alice");
    assert_eq!(response.headers()["x-groups"], "");
}

#[tokio::test]
async fn test_group_policy_from_headers() {
    let response = app()
        .oneshot(request(
            "/",
            Some(("alice", "secret")),
            &[
                ("Ldap-Allowed-Groups", "Admins,Users"),
                ("Ldap-Allowed-Groups-Conditional", "and"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-groups"], "Admins,Users");
}

#[tokio::test]
async fn test_group_mismatch_denies() {
    let response = app()
        .oneshot(request(
            "/",
            Some(("alice", "secret")),
            &[("Ldap-Allowed-Groups", "Finance")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_password_denies() {
    let response = app()
        .oneshot(request("/", Some(("alice", "wrong")), &[]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_conditional_denies_as_configuration_error() {
    let response = app()
        .oneshot(request(
            "/",
            Some(("alice", "secret")),
            &[("Ldap-Allowed-Groups-Users-Conditional", "xor")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_server_header_is_blanked() {
    let response = app()
        .oneshot(request("/", Some(("alice", "secret")), &[]))
        .await
        .unwrap();
    assert_eq!(response.headers()[header::SERVER], "");
}

#[tokio::test]
async fn test_repeated_requests_share_the_cache() {
    // Same app instance: the second request must hit the decision cache and
    // still produce the same answer
    let app = app();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request("/", Some(("alice", "secret")), &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
