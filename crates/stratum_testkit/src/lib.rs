//! # Stratum Testkit
//!
//! Test utilities for the Stratum environment layer.
//!
//! This crate provides:
//! - Fixtures for host and in-memory environments
//! - Property-based test generators using proptest
//! - Contract checks that every `Env` implementation must pass
//! - Stress helpers for concurrent readers and appenders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stratum_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_env() {
//!     with_host_env(|env, root| {
//!         contract::check_write_then_read(env, root, 4096);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod contract;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::contract;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
