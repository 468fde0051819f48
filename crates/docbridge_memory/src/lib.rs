//! # DocBridge Memory
//!
//! Embedded, in-process backend for DocBridge.
//!
//! This crate provides:
//! - [`MemoryDatabase`], a [`docbridge_core::Database`] needing no
//!   external service
//! - A query matcher and update applier over stored documents
//! - Unique-key tables giving constant-time duplicate detection
//!
//! Writes that must preserve a unique index are serialised through a
//! [`docbridge_core::KeyedMutex`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
mod database;
pub mod dialect;
pub mod matcher;
pub mod update;

pub use database::{AutoIdHook, MemoryDatabase};
pub use dialect::{MemoryDialect, NULL_PLACEHOLDER};
