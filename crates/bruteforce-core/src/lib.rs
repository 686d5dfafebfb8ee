//! bruteforce-core: Failure-rate guard for ldapgate
//!
//! Tracks authentication failures per client source address and temporarily
//! blocks an address once it accumulates too many failures inside a time
//! window. State is in-memory and process-local; the window is anchored at
//! the first recorded failure and the record resets once it elapses.
//!
//! # Example
//!
//! ```rust
//! use bruteforce_core::{FailureGuard, GuardConfig};
//! use std::net::IpAddr;
//!
//! let guard = FailureGuard::new(GuardConfig {
//!     enabled: true,
//!     max_failures: 3,
//!     window_seconds: 10,
//! });
//!
//! let addr: IpAddr = "192.0.2.7".parse().unwrap();
//! assert!(!guard.is_blocked(addr));
//!
//! for _ in 0..3 {
//!     guard.record_failure(addr);
//! }
//! assert!(guard.is_blocked(addr));
//! ```

pub mod config;
pub mod guard;

// Re-export public types
pub use config::GuardConfig;
pub use guard::FailureGuard;
