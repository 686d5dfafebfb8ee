//! Core authorization decision logic
//!
//! Implements the cache -> directory cascade with user-list and group-list
//! policy on top. Every failure path is terminal for the current request and
//! surfaces only as ALLOW/DENY; nothing propagates as an error across this
//! interface.

use crate::cache::{CacheSettings, DecisionCache};
use crate::directory::DirectoryClient;
use crate::policy::{Conditional, PolicyConfig};
use bruteforce_core::FailureGuard;
use std::net::IpAddr;
use tracing::{debug, error, info};

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Username or password empty; no directory call was made
    EmptyCredentials,
    /// Source address blocked by the failure guard
    SourceBlocked,
    /// Bind failed (invalid credentials or directory failure)
    InvalidCredentials,
    /// Username not in the allowed-users list
    UserNotAllowed,
    /// Allowed-groups policy not satisfied
    GroupMismatch,
    /// Invalid policy configuration (distinct from a normal mismatch)
    ConfigurationError,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::EmptyCredentials => write!(f, "username or password empty"),
            DenyReason::SourceBlocked => write!(f, "source address blocked"),
            DenyReason::InvalidCredentials => write!(f, "invalid credentials"),
            DenyReason::UserNotAllowed => write!(f, "user not in allowed users"),
            DenyReason::GroupMismatch => write!(f, "allowed groups not matched"),
            DenyReason::ConfigurationError => write!(f, "configuration error"),
        }
    }
}

/// Authorization decision result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzDecision {
    /// Request allowed; matched groups become response metadata
    Allow {
        username: String,
        matched_groups: Vec<String>,
    },
    /// Request denied; the reason is for logs, never for the caller
    Deny { reason: DenyReason },
}

impl AuthzDecision {
    pub fn allow(username: impl Into<String>, matched_groups: Vec<String>) -> Self {
        AuthzDecision::Allow {
            username: username.into(),
            matched_groups,
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        AuthzDecision::Deny { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthzDecision::Allow { .. })
    }
}

/// One inbound authorization request
#[derive(Debug, Clone)]
pub struct AuthzRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub source: IpAddr,
}

/// Decide ALLOW/DENY for one request
///
/// Sequences failure-guard check, cached-or-fresh credential verification,
/// the allowed-users check (trim + case-fold both sides) and the
/// allowed-groups check (cache first, directory fallback), recording
/// successes into the cache and bind failures into the guard.
pub async fn check_authz(
    request: &AuthzRequest<'_>,
    policy: &PolicyConfig,
    cache: &DecisionCache,
    guard: &FailureGuard,
    client: &DirectoryClient,
) -> AuthzDecision {
    let username = request.username;

    if username.is_empty() || request.password.is_empty() {
        error!("Username or password empty");
        return AuthzDecision::deny(DenyReason::EmptyCredentials);
    }

    // Terminal: no directory call, no cache or guard mutation
    if guard.is_blocked(request.source) {
        return AuthzDecision::deny(DenyReason::SourceBlocked);
    }

    // Credential check: cache first, then a fresh bind
    if !cache.check_credential(username, request.password) {
        if client
            .authenticate_user(username, request.password, policy)
            .await
        {
            cache.record_credential(username, request.password);
        } else {
            guard.record_failure(request.source);
            return AuthzDecision::deny(DenyReason::InvalidCredentials);
        }
    }

    // Allowed-users policy
    if !policy.allowed_users.is_empty() {
        let allowed_users = policy.allowed_users_normalized();
        let caller = username.trim().to_lowercase();
        if allowed_users.contains(&caller) {
            info!(
                username,
                allowed_users = %allowed_users.join(","),
                "Username inside the allowed users list"
            );
            if policy.users_groups_conditional == Conditional::Or {
                return AuthzDecision::allow(username, Vec::new());
            }
        } else if policy.allowed_groups.is_empty()
            || policy.users_groups_conditional == Conditional::And
        {
            info!(
                username,
                allowed_users = %allowed_users.join(","),
                "Username not found inside the allowed users list"
            );
            return AuthzDecision::deny(DenyReason::UserNotAllowed);
        }
    }

    // Allowed-groups policy
    let mut matched_groups = Vec::new();
    if !policy.allowed_groups.is_empty() {
        let requested = policy.allowed_groups_normalized();
        // Settings travel with this request's policy, never through shared
        // cache state, so a concurrent request with a different policy
        // cannot change how this one evaluates a hit
        let settings = CacheSettings {
            case_sensitive: policy.group_case_sensitive,
            conditional: policy.groups_conditional,
        };
        // Only a cached success short-circuits; anything else goes to the
        // directory for a fresh evaluation
        match cache.check_groups(username, &requested, settings) {
            Some((true, matched)) => {
                debug!(username, "Group policy satisfied from cache");
                matched_groups = matched;
            }
            _ => {
                let eval = client.evaluate_groups(username, &requested, policy).await;
                if !eval.ok {
                    return AuthzDecision::deny(DenyReason::GroupMismatch);
                }
                cache.record_groups(username, eval.raw_groups, settings);
                matched_groups = eval.matched_groups;
            }
        }
    }

    AuthzDecision::allow(username, matched_groups)
}
