//! # DocBridge Mongo
//!
//! Networked document-store backend for DocBridge, built on the official
//! `mongodb` driver.
//!
//! Identifiers that are 24-character hex strings are stored as
//! `ObjectId`s and returned as hex strings under `id`; the native `_id`
//! field never surfaces. Duplicate-key failures are re-wrapped as
//! [`docbridge_core::DbError::DuplicateRecord`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
pub mod dialect;
mod error;

pub use database::MongoDatabase;
pub use dialect::MongoDialect;
pub use error::parse_duplicate_key;
