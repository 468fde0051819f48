//! # DocBridge
//!
//! One storage contract over two backends: a networked document store and
//! an embedded in-memory store. Callers write their data-access logic once
//! against [`Database`] and pick the backend with a connection string.
//!
//! | Scheme | Backend |
//! |--------|---------|
//! | `memory://` | [`MemoryDatabase`] |
//! | `mongodb://`, `mongodb+srv://` | [`MongoDatabase`] |
//!
//! ## Example
//!
//! ```rust,ignore
//! use docbridge::{record, DatabaseOptions, FindOptions, Sort};
//!
//! let db = docbridge::connect("memory://local", DatabaseOptions::new("shop")).await?;
//! db.create_unique_index("widgets", docbridge::IndexDefinition::new(["sku"])).await?;
//! db.create_one("widgets", record! { "sku" => "A", "count" => 5 }).await?;
//! let widgets = db
//!     .find("widgets", &record! {}, &FindOptions::new().sort(Sort::desc("count")))
//!     .await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod registry;
mod url;

pub use registry::{registry_key, ConnectionRegistry};
pub use url::{backend_for, connect, open, MEMORY_SCHEME, MONGO_SCHEMES};

pub use docbridge_core::{
    record, translate, BackendKind, Database, DatabaseOptions, DbError, DbResult, Document,
    FindOptions, IndexDefinition, KeyedMutex, KeyedMutexGuard, Sort, SortDirection, SyncReport,
    Value, WriteAction,
};
pub use docbridge_memory::MemoryDatabase;
pub use docbridge_mongo::MongoDatabase;
