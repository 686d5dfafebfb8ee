//! Per-request policy resolution
//!
//! One pure function maps request headers plus deployment defaults to an
//! immutable `PolicyConfig`. Header values win over environment defaults;
//! operator restriction lists intersect the effective allow-lists so a
//! header can narrow but never widen what the deployment permits.

use crate::config::{split_csv, Settings};
use authz_core::policy::{Conditional, InvalidConditional, PolicyConfig};
use axum::http::HeaderMap;
use thiserror::Error;

const H_ENDPOINT: &str = "ldap-endpoint";
const H_MANAGER_DN: &str = "ldap-manager-dn-username";
const H_MANAGER_PASSWORD: &str = "ldap-manager-password";
const H_SEARCH_BASE: &str = "ldap-search-base";
const H_SEARCH_FILTER: &str = "ldap-search-filter";
const H_GROUP_ATTRIBUTE: &str = "ldap-group-membership-attribute";
const H_ALLOWED_GROUPS: &str = "ldap-allowed-groups";
const H_GROUPS_CONDITIONAL: &str = "ldap-allowed-groups-conditional";
const H_CASE_SENSITIVE: &str = "ldap-allowed-groups-case-sensitive";
const H_ALLOWED_USERS: &str = "ldap-allowed-users";
const H_USERS_GROUPS_CONDITIONAL: &str = "ldap-allowed-groups-users-conditional";
const H_BIND_DN: &str = "ldap-bind-dn";

/// Policy resolution failure; denied at the boundary as a configuration
/// error, never forwarded to the directory
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("missing required parameter {0}")]
    MissingParameter(&'static str),
    #[error(transparent)]
    InvalidConditional(#[from] InvalidConditional),
}

/// Resolve one request's policy from headers over deployment defaults
pub fn resolve_policy(headers: &HeaderMap, settings: &Settings) -> Result<PolicyConfig, ResolveError> {
    let defaults = &settings.defaults;

    let endpoint = resolve_required(headers, H_ENDPOINT, &defaults.endpoint, "LDAP_ENDPOINT")?;
    let manager_dn = resolve_required(
        headers,
        H_MANAGER_DN,
        &defaults.manager_dn,
        "LDAP_MANAGER_DN_USERNAME",
    )?;
    let manager_password = resolve_required(
        headers,
        H_MANAGER_PASSWORD,
        &defaults.manager_password,
        "LDAP_MANAGER_PASSWORD",
    )?;
    let search_base = resolve_required(
        headers,
        H_SEARCH_BASE,
        &defaults.search_base,
        "LDAP_SEARCH_BASE",
    )?;
    let search_filter = resolve_required(
        headers,
        H_SEARCH_FILTER,
        &defaults.search_filter,
        "LDAP_SEARCH_FILTER",
    )?;

    let groups_conditional = resolve_optional(headers, H_GROUPS_CONDITIONAL, &defaults.groups_conditional)
        .map(|v| v.parse::<Conditional>())
        .transpose()?
        .unwrap_or(Conditional::And);
    let users_groups_conditional = resolve_optional(
        headers,
        H_USERS_GROUPS_CONDITIONAL,
        &defaults.users_groups_conditional,
    )
    .map(|v| v.parse::<Conditional>())
    .transpose()?
    .unwrap_or(Conditional::Or);

    let group_case_sensitive =
        match resolve_optional(headers, H_CASE_SENSITIVE, &defaults.group_case_sensitive) {
            Some(value) => value == "enabled",
            None => true,
        };

    let allowed_users = resolve_optional(headers, H_ALLOWED_USERS, &defaults.allowed_users)
        .map(|v| split_csv(&v))
        .unwrap_or_default();
    let allowed_groups = resolve_optional(headers, H_ALLOWED_GROUPS, &defaults.allowed_groups)
        .map(|v| split_csv(&v))
        .unwrap_or_default();

    let allowed_users = restrict_users(allowed_users, settings.restricted_users.as_deref());
    let allowed_groups = restrict_groups(allowed_groups, settings.restricted_groups.as_deref());

    Ok(PolicyConfig {
        endpoint,
        manager_dn,
        manager_password,
        bind_dn_template: resolve_optional(headers, H_BIND_DN, &defaults.bind_dn)
            .unwrap_or_else(|| "{username}".to_string()),
        search_base,
        search_filter_template: search_filter,
        group_attribute: resolve_optional(headers, H_GROUP_ATTRIBUTE, &defaults.group_attribute)
            .unwrap_or_else(|| "memberOf".to_string()),
        allowed_users,
        allowed_groups,
        groups_conditional,
        users_groups_conditional,
        group_case_sensitive,
        ca_cert_file: settings.ldap_tls_ca_cert_file.clone(),
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn resolve_optional(headers: &HeaderMap, name: &str, default: &Option<String>) -> Option<String> {
    header_value(headers, name).or_else(|| default.clone())
}

fn resolve_required(
    headers: &HeaderMap,
    name: &str,
    default: &Option<String>,
    parameter: &'static str,
) -> Result<String, ResolveError> {
    resolve_optional(headers, name, default).ok_or(ResolveError::MissingParameter(parameter))
}

/// Intersect the effective users with the operator restriction list
/// (compared trimmed and case-folded, like the membership test itself)
fn restrict_users(effective: Vec<String>, restriction: Option<&[String]>) -> Vec<String> {
    let Some(restriction) = restriction else {
        return effective;
    };
    let restriction: Vec<String> = restriction
        .iter()
        .map(|u| u.trim().to_lowercase())
        .collect();
    effective
        .into_iter()
        .filter(|u| restriction.contains(&u.trim().to_lowercase()))
        .collect()
}

/// Intersect the effective group patterns with the operator restriction
/// list (compared trimmed, case preserved, like pattern normalization)
fn restrict_groups(effective: Vec<String>, restriction: Option<&[String]>) -> Vec<String> {
    let Some(restriction) = restriction else {
        return effective;
    };
    let restriction: Vec<String> = restriction.iter().map(|g| g.trim().to_string()).collect();
    effective
        .into_iter()
        .filter(|g| restriction.contains(&g.trim().to_string()))
        .collect()
}
