//! Process configuration from the environment
//!
//! Deployment defaults for every per-request LDAP parameter, cache and
//! failure-guard tuning, and the listener port. Headers override these
//! defaults per request (see `resolve`); everything here is read once at
//! startup.

use anyhow::{anyhow, Result};
use bruteforce_core::GuardConfig;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Deployment defaults for header-overridable LDAP parameters
///
/// Raw strings, kept exactly as the environment supplied them; parsing and
/// validation happen at per-request resolution since a header may replace
/// any of these.
#[derive(Debug, Clone, Default)]
pub struct PolicyDefaults {
    pub endpoint: Option<String>,
    pub manager_dn: Option<String>,
    pub manager_password: Option<String>,
    pub search_base: Option<String>,
    pub search_filter: Option<String>,
    pub group_attribute: Option<String>,
    pub allowed_groups: Option<String>,
    pub groups_conditional: Option<String>,
    pub group_case_sensitive: Option<String>,
    pub allowed_users: Option<String>,
    pub users_groups_conditional: Option<String>,
    pub bind_dn: Option<String>,
}

/// Resolved process settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Listener port (the caches assume exactly one worker process)
    pub port: u16,
    /// TTL for both cache entry types
    pub cache_expiration: Duration,
    pub guard: GuardConfig,
    /// CA bundle for validating the directory server certificate
    pub ldap_tls_ca_cert_file: Option<PathBuf>,
    pub defaults: PolicyDefaults,
    /// Operator restriction list: the effective allowed-users list is
    /// intersected with this when present (narrows, never widens)
    pub restricted_users: Option<Vec<String>>,
    /// Operator restriction list for allowed groups
    pub restricted_groups: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 9000,
            cache_expiration: Duration::from_secs(5 * 60),
            guard: GuardConfig::default(),
            ldap_tls_ca_cert_file: None,
            defaults: PolicyDefaults::default(),
            restricted_users: None,
            restricted_groups: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment
    pub fn from_env() -> Result<Self> {
        let cache_expiration_minutes: u64 = parse("CACHE_EXPIRATION")?.unwrap_or(5);
        let guard = GuardConfig {
            enabled: matches_enabled(parse::<String>("BRUTE_FORCE_PROTECTION")?),
            max_failures: parse("BRUTE_FORCE_FAILURES")?.unwrap_or(3),
            window_seconds: parse("BRUTE_FORCE_EXPIRATION")?.unwrap_or(10),
        };

        Ok(Self {
            port: parse("PORT")?.unwrap_or(9000),
            cache_expiration: Duration::from_secs(cache_expiration_minutes * 60),
            guard,
            ldap_tls_ca_cert_file: parse::<PathBuf>("LDAP_TLS_CA_CERT_FILE")?,
            defaults: PolicyDefaults {
                endpoint: parse("LDAP_ENDPOINT")?,
                manager_dn: parse("LDAP_MANAGER_DN_USERNAME")?,
                manager_password: parse("LDAP_MANAGER_PASSWORD")?,
                search_base: parse("LDAP_SEARCH_BASE")?,
                search_filter: parse("LDAP_SEARCH_FILTER")?,
                group_attribute: parse("LDAP_GROUP_MEMBERSHIP_ATTRIBUTE")?,
                allowed_groups: parse("LDAP_ALLOWED_GROUPS")?,
                groups_conditional: parse("LDAP_ALLOWED_GROUPS_CONDITIONAL")?,
                group_case_sensitive: parse("LDAP_ALLOWED_GROUPS_CASE_SENSITIVE")?,
                allowed_users: parse("LDAP_ALLOWED_USERS")?,
                users_groups_conditional: parse("LDAP_ALLOWED_GROUPS_USERS_CONDITIONAL")?,
                bind_dn: parse("LDAP_BIND_DN")?,
            },
            restricted_users: parse::<String>("LDAP_RESTRICTED_USERS")?
                .map(|s| split_csv(&s)),
            restricted_groups: parse::<String>("LDAP_RESTRICTED_GROUPS")?
                .map(|s| split_csv(&s)),
        })
    }
}

/// Split a comma-separated list, keeping items raw (normalization is the
/// decision pipeline's job)
pub fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(|item| item.to_string()).collect()
}

/// The original toggle convention: the literal value "enabled" turns a
/// feature on, anything else (or unset) leaves it off
pub fn matches_enabled(value: Option<String>) -> bool {
    value.as_deref() == Some("enabled")
}

/// Parse an environment variable, treating unset and empty as absent
fn parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv_keeps_items_raw() {
        assert_eq!(
            split_csv("alice, Bob ,carol"),
            vec![
                "alice".to_string(),
                " Bob ".to_string(),
                "carol".to_string()
            ]
        );
    }

    #[test]
    fn test_matches_enabled() {
        assert!(matches_enabled(Some("enabled".to_string())));
        assert!(!matches_enabled(Some("true".to_string())));
        assert!(!matches_enabled(None));
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.cache_expiration, Duration::from_secs(300));
        assert!(!settings.guard.enabled);
    }
}
