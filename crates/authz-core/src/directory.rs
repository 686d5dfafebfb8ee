//! Directory access
//!
//! The decision pipeline never speaks the LDAP wire protocol itself; it
//! consumes the [`Directory`] capability (bind + subtree search) and the
//! production implementation [`LdapDirectory`] provides it over `ldap3`.
//! Tests substitute an in-memory implementation at the same seam.

use crate::matching::{self, GroupEvaluation};
use crate::policy::PolicyConfig;
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// LDAP result code for invalid credentials
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Directory protocol failure
///
/// Indistinguishable from invalid credentials to the decision pipeline's
/// callers (both are a DENY), but logged at a different severity.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("directory connection failed: {0}")]
    Connect(String),
    #[error("directory operation failed: {0}")]
    Operation(String),
    #[error("TLS configuration failed: {0}")]
    Tls(String),
}

/// Outcome of a bind attempt that reached the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    Success,
    InvalidCredentials,
}

/// One subtree search result: attribute name to raw byte-string values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub attributes: HashMap<String, Vec<Vec<u8>>>,
}

/// Abstract directory-protocol capability (bind, subtree search)
#[async_trait]
pub trait Directory: Send + Sync {
    /// Authenticate a connection as `dn` with `password`
    async fn simple_bind(
        &self,
        policy: &PolicyConfig,
        dn: &str,
        password: &str,
    ) -> Result<BindOutcome, DirectoryError>;

    /// Bind as the policy's manager identity, then search the whole subtree
    /// under the policy's search base with the given filter
    async fn search_subtree(
        &self,
        policy: &PolicyConfig,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// Production [`Directory`] over `ldap3`
///
/// One connection per operation, configured from the per-request policy.
/// Server certificate validation is always enforced; a CA bundle from the
/// policy is added to the trust roots when present.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    op_timeout: Duration,
}

impl Default for LdapDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl LdapDirectory {
    pub fn new() -> Self {
        // Bound every directory operation so one slow server cannot stall
        // the decision pipeline.
        Self {
            op_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self { op_timeout }
    }

    async fn connect(&self, policy: &PolicyConfig) -> Result<ldap3::Ldap, DirectoryError> {
        let mut settings = LdapConnSettings::new().set_conn_timeout(self.op_timeout);

        if let Some(ca_path) = &policy.ca_cert_file {
            let pem = std::fs::read(ca_path)
                .map_err(|e| DirectoryError::Tls(format!("{}: {e}", ca_path.display())))?;
            let cert = native_tls::Certificate::from_pem(&pem)
                .map_err(|e| DirectoryError::Tls(e.to_string()))?;
            let connector = native_tls::TlsConnector::builder()
                .add_root_certificate(cert)
                .build()
                .map_err(|e| DirectoryError::Tls(e.to_string()))?;
            settings = settings.set_connector(connector);
        }

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &policy.endpoint)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;
        ldap3::drive!(conn);
        Ok(ldap)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn simple_bind(
        &self,
        policy: &PolicyConfig,
        dn: &str,
        password: &str,
    ) -> Result<BindOutcome, DirectoryError> {
        let mut ldap = self.connect(policy).await?;
        let result = ldap
            .with_timeout(self.op_timeout)
            .simple_bind(dn, password)
            .await
            .map_err(|e| DirectoryError::Operation(e.to_string()))?;
        let _ = ldap.unbind().await;

        match result.rc {
            0 => Ok(BindOutcome::Success),
            RC_INVALID_CREDENTIALS => Ok(BindOutcome::InvalidCredentials),
            rc => Err(DirectoryError::Operation(format!(
                "bind failed with result code {rc}: {}",
                result.text
            ))),
        }
    }

    async fn search_subtree(
        &self,
        policy: &PolicyConfig,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut ldap = self.connect(policy).await?;

        let bind = ldap
            .with_timeout(self.op_timeout)
            .simple_bind(&policy.manager_dn, &policy.manager_password)
            .await
            .map_err(|e| DirectoryError::Operation(e.to_string()))?;
        if bind.rc != 0 {
            let _ = ldap.unbind().await;
            return Err(DirectoryError::Operation(format!(
                "manager bind failed with result code {}: {}",
                bind.rc, bind.text
            )));
        }

        let search = ldap
            .with_timeout(self.op_timeout)
            .search(&policy.search_base, Scope::Subtree, filter, vec!["*"])
            .await
            .map_err(|e| DirectoryError::Operation(e.to_string()))?;
        let _ = ldap.unbind().await;

        let (entries, _) = search
            .success()
            .map_err(|e| DirectoryError::Operation(e.to_string()))?;

        Ok(
            entries
                .into_iter()
                .map(|entry| {
                    let entry = SearchEntry::construct(entry);
                    let mut attributes: HashMap<String, Vec<Vec<u8>>> = entry
                        .attrs
                        .into_iter()
                        .map(|(name, values)| {
                            (name, values.into_iter().map(String::into_bytes).collect())
                        })
                        .collect();
                    attributes.extend(entry.bin_attrs);
                    DirectoryEntry { attributes }
                })
                .collect(),
        )
    }
}

/// Flatten the configured membership attribute across the whole tree
///
/// Values are decoded as UTF-8 text; entries lacking the attribute and
/// values that are not valid UTF-8 are skipped silently.
pub fn extract_groups(tree: &[DirectoryEntry], attribute: &str) -> Vec<String> {
    tree
        .iter()
        .filter_map(|entry| entry.attributes.get(attribute))
        .flatten()
        .filter_map(|value| String::from_utf8(value.clone()).ok())
        .collect()
}

/// Directory query and group-matching engine
///
/// Owns the collaborator seam; every failure folds into a boolean or empty
/// result, never an error crossing to the orchestrator.
#[derive(Clone)]
pub struct DirectoryClient {
    directory: Arc<dyn Directory>,
}

impl DirectoryClient {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Bind as the user to verify the credential pair
    ///
    /// True only on a successful bind. Invalid credentials and protocol
    /// failures are both false, logged at different severities.
    pub async fn authenticate_user(
        &self,
        username: &str,
        password: &str,
        policy: &PolicyConfig,
    ) -> bool {
        let bind_dn = policy.bind_dn(username);
        info!(username, bind_dn = %bind_dn, "Authenticating user");

        let start = Instant::now();
        match self.directory.simple_bind(policy, &bind_dn, password).await {
            Ok(BindOutcome::Success) => {
                info!(
                    username,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Authentication successful"
                );
                true
            }
            Ok(BindOutcome::InvalidCredentials) => {
                warn!(username, "Invalid credentials");
                false
            }
            Err(e) => {
                error!(username, error = %e, "There was an error trying to bind");
                false
            }
        }
    }

    /// Manager bind + subtree search for the user's entries
    ///
    /// Empty on any bind/search failure; indistinguishable from a user with
    /// zero group memberships, which keeps the pipeline fail-closed.
    pub async fn fetch_group_tree(
        &self,
        username: &str,
        policy: &PolicyConfig,
    ) -> Vec<DirectoryEntry> {
        let filter = policy.search_filter(username);

        let start = Instant::now();
        match self.directory.search_subtree(policy, &filter).await {
            Ok(tree) => {
                info!(
                    filter = %filter,
                    entries = tree.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Search by filter"
                );
                tree
            }
            Err(e) => {
                error!(filter = %filter, error = %e, "There was an error trying to search");
                Vec::new()
            }
        }
    }

    /// Fetch the user's groups and evaluate the requested patterns
    pub async fn evaluate_groups(
        &self,
        username: &str,
        requested: &[String],
        policy: &PolicyConfig,
    ) -> GroupEvaluation {
        let tree = self.fetch_group_tree(username, policy).await;
        let raw_groups = extract_groups(&tree, &policy.group_attribute);
        matching::evaluate_groups(
            username,
            requested,
            &raw_groups,
            policy.groups_conditional,
            policy.group_case_sensitive,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(attrs: &[(&str, &[&str])]) -> DirectoryEntry {
        DirectoryEntry {
            attributes: attrs
                .iter()
                .map(|(name, values)| {
                    (
                        name.to_string(),
                        values.iter().map(|v| v.as_bytes().to_vec()).collect(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_extract_groups_flattens_across_entries() {
        let tree = vec![
            entry(&[("memberOf", &["CN=Admins,OU=Groups", "CN=Users,OU=Groups"])]),
            entry(&[("memberOf", &["CN=Finance,OU=Groups"])]),
        ];
        assert_eq!(
            extract_groups(&tree, "memberOf"),
            vec![
                "CN=Admins,OU=Groups".to_string(),
                "CN=Users,OU=Groups".to_string(),
                "CN=Finance,OU=Groups".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_groups_skips_entries_without_attribute() {
        let tree = vec![
            entry(&[("objectClass", &["person"])]),
            entry(&[("memberOf", &["CN=Admins,OU=Groups"])]),
        ];
        assert_eq!(
            extract_groups(&tree, "memberOf"),
            vec!["CN=Admins,OU=Groups".to_string()]
        );
    }

    #[test]
    fn test_extract_groups_skips_invalid_utf8() {
        let mut broken = entry(&[]);
        broken
            .attributes
            .insert("memberOf".to_string(), vec![vec![0xff, 0xfe]]);
        let tree = vec![broken, entry(&[("memberOf", &["CN=Admins,OU=Groups"])])];
        assert_eq!(
            extract_groups(&tree, "memberOf"),
            vec!["CN=Admins,OU=Groups".to_string()]
        );
    }
}
