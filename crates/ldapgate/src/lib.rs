//! ldapgate: external authorization gatekeeper for the nginx auth_request
//! pattern
//!
//! The reverse proxy sends one subrequest per inbound request; ldapgate
//! verifies the Basic credentials against an LDAP directory, evaluates
//! allowed-users/allowed-groups policy and answers 200 (with the matched
//! groups as response headers) or 401. The decision pipeline itself lives in
//! `authz-core` and `bruteforce-core`; this crate is the thin boundary:
//! environment configuration, per-request header resolution and the HTTP
//! surface.
//!
//! State (decision cache, failure guard) is in-memory and process-local, so
//! deployments must run exactly one worker process.

pub mod config;
pub mod resolve;
pub mod server;

pub use config::Settings;
pub use resolve::{resolve_policy, ResolveError};
pub use server::{router, AppState};
