//! Per-request authorization policy
//!
//! A `PolicyConfig` is resolved once per request by the boundary layer
//! (request headers over deployment defaults) and consumed read-only by the
//! decision pipeline. It is reconstructed per request because any parameter
//! may vary by header.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder substituted with the literal username in the bind-DN and
/// search-filter templates.
pub const USERNAME_PLACEHOLDER: &str = "{username}";

/// AND/OR combinator for allow-list evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conditional {
    And,
    Or,
}

/// Unrecognized conditional value; a configuration error, denied distinctly
/// from a normal policy mismatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid conditional {0:?}, expected \"and\" or \"or\"")]
pub struct InvalidConditional(pub String);

impl FromStr for Conditional {
    type Err = InvalidConditional;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "and" => Ok(Conditional::And),
            "or" => Ok(Conditional::Or),
            other => Err(InvalidConditional(other.to_string())),
        }
    }
}

impl std::fmt::Display for Conditional {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conditional::And => write!(f, "and"),
            Conditional::Or => write!(f, "or"),
        }
    }
}

/// Immutable per-request policy
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Directory server URL, e.g. `ldaps://ldap.example.com`
    pub endpoint: String,
    /// Manager identity used for the group-membership search
    pub manager_dn: String,
    pub manager_password: String,
    /// Bind-DN template containing `{username}`
    pub bind_dn_template: String,
    /// Subtree search base DN
    pub search_base: String,
    /// Search filter template containing `{username}`
    pub search_filter_template: String,
    /// Attribute holding group memberships, e.g. `memberOf`
    pub group_attribute: String,
    /// Allowed usernames (raw, comma-split by the boundary)
    pub allowed_users: Vec<String>,
    /// Allowed group patterns (raw)
    pub allowed_groups: Vec<String>,
    /// Combinator across group patterns
    pub groups_conditional: Conditional,
    /// Combinator between the user-list and group-list checks
    pub users_groups_conditional: Conditional,
    /// Whether group pattern matching is case sensitive
    pub group_case_sensitive: bool,
    /// Optional CA bundle used to validate the directory server certificate
    pub ca_cert_file: Option<PathBuf>,
}

impl PolicyConfig {
    /// Bind DN for a username, with the template placeholder substituted
    pub fn bind_dn(&self, username: &str) -> String {
        self.bind_dn_template.replace(USERNAME_PLACEHOLDER, username)
    }

    /// Search filter for a username, with the template placeholder substituted
    pub fn search_filter(&self, username: &str) -> String {
        self
            .search_filter_template
            .replace(USERNAME_PLACEHOLDER, username)
    }

    /// Allowed users, trimmed and lowercased for membership tests
    pub fn allowed_users_normalized(&self) -> Vec<String> {
        self
            .allowed_users
            .iter()
            .map(|u| u.trim().to_lowercase())
            .collect()
    }

    /// Allowed group patterns, trimmed; case is preserved because patterns
    /// are folded (or not) at match time
    pub fn allowed_groups_normalized(&self) -> Vec<String> {
        self
            .allowed_groups
            .iter()
            .map(|g| g.trim().to_string())
            .collect()
    }
}
