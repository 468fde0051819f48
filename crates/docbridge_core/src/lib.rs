//! # DocBridge Core
//!
//! The storage contract shared by every DocBridge backend.
//!
//! This crate provides:
//! - [`Value`] / [`Document`], the one record representation
//! - The [`Database`] contract and the [`DbError`] taxonomy
//! - Query and identifier translation into backend dialects ([`translate`])
//! - Index identity, diffing and synchronization ([`index`])
//! - [`KeyedMutex`], FIFO mutual exclusion scoped to a string key
//!
//! Backends live in their own crates and implement [`Database`] and
//! [`IndexBackend`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
pub mod index;
mod mutex;
mod query;
pub mod translate;
mod value;

pub use config::{DatabaseOptions, RESERVED_DATABASE_NAMES};
pub use database::{BackendKind, Database};
pub use error::{DbError, DbResult, WriteAction};
pub use index::{IndexBackend, IndexDefinition, IndexInfo, IndexManager, SyncPlan, SyncReport};
pub use mutex::{KeyedMutex, KeyedMutexGuard};
pub use query::{FindOptions, Sort, SortDirection};
pub use translate::{Dialect, ID_FIELD};
pub use value::{Document, Value};
