//! # DocBridge Testkit
//!
//! Test utilities for DocBridge.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - A conformance suite any backend can be run against
//! - Tracing setup for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docbridge_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn memory_backend_conforms() {
//!     init_test_tracing();
//!     let db = TestDatabase::memory().await;
//!     conformance::run_all(db.as_ref()).await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
