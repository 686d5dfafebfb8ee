//! Group pattern matching
//!
//! Shared by the directory client and the decision cache so a cached raw
//! group list is evaluated with exactly the same semantics as a fresh one.
//!
//! A raw directory group string matches a pattern when:
//! 1. a Common Name can be extracted from it (leading `CN=` marker,
//!    case-insensitive, followed by word characters, spaces, underscores
//!    and hyphens), and
//! 2. the pattern, applied as a whole-string regex `pattern.*`, matches the
//!    extracted CN (prefix semantics, not substring and not exact).
//!
//! "No CN extractable" and "no match" are both plain non-matches, never
//! errors; a pattern that fails to compile also simply does not match.

use crate::policy::Conditional;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info};

static CN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CN=((?:\w*\s?_?-?)*)").expect("static regex"));

/// Extract the Common Name component from a raw directory group string
pub fn extract_cn(raw_group: &str) -> Option<&str> {
    CN_RE
        .captures(raw_group)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Match one allow-list pattern against one raw directory group string
///
/// Returns the extracted CN (original case preserved) on a match, `None`
/// otherwise. Both sides are lowercased before matching when
/// `case_sensitive` is false.
pub fn match_group(pattern: &str, raw_group: &str, case_sensitive: bool) -> Option<String> {
    let cn = extract_cn(raw_group)?;

    let (pattern, candidate) = if case_sensitive {
        (pattern.to_string(), cn.to_string())
    } else {
        (pattern.to_lowercase(), cn.to_lowercase())
    };

    // Whole-string prefix match: pattern followed by anything
    let re = Regex::new(&format!("^(?:{pattern}).*$")).ok()?;
    if re.is_match(&candidate) {
        Some(cn.to_string())
    } else {
        None
    }
}

/// Outcome of evaluating the allowed-groups policy against a raw group list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEvaluation {
    /// Whether the policy is satisfied
    pub ok: bool,
    /// Every CN matched by any pattern, in pattern order
    pub matched_groups: Vec<String>,
    /// The raw group list the evaluation ran against
    pub raw_groups: Vec<String>,
}

impl GroupEvaluation {
    fn failed() -> Self {
        Self {
            ok: false,
            matched_groups: Vec::new(),
            raw_groups: Vec::new(),
        }
    }
}

/// Evaluate every requested pattern against the raw group list
///
/// Under `or` the policy is satisfied when any pattern matched anything;
/// under `and` every pattern must have matched at least one raw group
/// (pattern-level completeness, not raw-group-count completeness).
pub fn evaluate_groups(
    username: &str,
    requested: &[String],
    raw_groups: &[String],
    conditional: Conditional,
    case_sensitive: bool,
) -> GroupEvaluation {
    debug!(
        username,
        groups = %requested.join(","),
        %conditional,
        "Validating groups"
    );

    let mut matched_groups = Vec::new();
    let mut patterns_with_matches = 0usize;
    for pattern in requested {
        let matches: Vec<String> = raw_groups
            .iter()
            .filter_map(|raw| match_group(pattern, raw, case_sensitive))
            .collect();
        if !matches.is_empty() {
            patterns_with_matches += 1;
            matched_groups.extend(matches);
        }
    }

    let ok = match conditional {
        Conditional::Or => !matched_groups.is_empty(),
        Conditional::And => patterns_with_matches == requested.len(),
    };

    if ok {
        info!(
            username,
            matched_groups = %matched_groups.join(","),
            %conditional,
            "Groups are valid for the user"
        );
        GroupEvaluation {
            ok,
            matched_groups,
            raw_groups: raw_groups.to_vec(),
        }
    } else {
        error!(
            username,
            matched_groups = %matched_groups.join(","),
            groups = %requested.join(","),
            %conditional,
            "Invalid groups for the user"
        );
        GroupEvaluation::failed()
    }
}
