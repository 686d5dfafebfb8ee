//! authz-core: LDAP-backed authorization decision pipeline for ldapgate
//!
//! Decides ALLOW/DENY for one inbound request given a credential pair, the
//! client source address and a per-request policy. The pipeline sequences
//! the failure guard, a TTL decision cache and the directory client, then
//! evaluates allowed-users and allowed-groups policy with AND/OR
//! combinators.
//!
//! # Features
//!
//! - **Decision cache**: in-memory TTL cache for validated credentials and
//!   fetched group sets, keyed by hashed credentials
//! - **Directory seam**: LDAP bind/search behind the [`Directory`] trait,
//!   with an `ldap3` production implementation
//! - **Fail-closed**: every directory failure is a DENY for that request
//!
//! # Example
//!
//! ```rust,ignore
//! use authz_core::prelude::*;
//! use bruteforce_core::{FailureGuard, GuardConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = DecisionCache::new(Duration::from_secs(300));
//! let guard = FailureGuard::new(GuardConfig::default());
//! let client = DirectoryClient::new(Arc::new(LdapDirectory::new()));
//!
//! let request = AuthzRequest {
//!     username: "alice",
//!     password: "secret",
//!     source: "192.0.2.7".parse().unwrap(),
//! };
//!
//! let decision = check_authz(&request, &policy, &cache, &guard, &client).await;
//! match decision {
//!     AuthzDecision::Allow { username, matched_groups } => {
//!         println!("allow {username}, groups {matched_groups:?}");
//!     }
//!     AuthzDecision::Deny { reason } => {
//!         println!("deny: {reason}");
//!     }
//! }
//! ```

pub mod cache;
pub mod decision;
pub mod directory;
pub mod matching;
pub mod policy;

// Re-export public types
pub use cache::{CacheSettings, DecisionCache};
pub use decision::{check_authz, AuthzDecision, AuthzRequest, DenyReason};
pub use directory::{
    extract_groups, BindOutcome, Directory, DirectoryClient, DirectoryEntry, DirectoryError,
    LdapDirectory,
};
pub use matching::{evaluate_groups, match_group, GroupEvaluation};
pub use policy::{Conditional, InvalidConditional, PolicyConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheSettings, DecisionCache};
    pub use crate::decision::{check_authz, AuthzDecision, AuthzRequest, DenyReason};
    pub use crate::directory::{Directory, DirectoryClient, LdapDirectory};
    pub use crate::policy::{Conditional, PolicyConfig};
}
