//! # ReplIDB Core
//!
//! In-memory transactional document store for ReplIDB.
//!
//! This crate provides:
//! - A catalog of databases, collections and indexes
//! - Single-writer transactions with copy-on-begin isolation
//! - A request envelope and typed commands (insert, update, delete,
//!   index and collection management)
//! - Filter matching and update modifiers
//!
//! A database created with [`Database::replica`] rejects writes from user
//! requests; only internal requests (the replication machinery) may write.
//!
//! ## Usage
//!
//! ```
//! use replidb_core::{Database, InsertArgument, InsertCommand, Namespace, Request};
//! use replidb_document::doc;
//!
//! let db = Database::new();
//! let mut txn = db.begin_write();
//! txn.execute(
//!     &Request::user("shop"),
//!     &InsertCommand,
//!     InsertArgument::new("orders", vec![doc! { "_id" => 1, "total" => 30 }]),
//! )
//! .unwrap();
//! txn.commit().unwrap();
//!
//! assert_eq!(db.count(&Namespace::new("shop", "orders")), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod command;
mod database;
mod error;
pub mod query;
mod transaction;
mod types;

pub use catalog::{Collection, IndexSpec, StoreState, ID_INDEX_NAME};
pub use command::{
    Command, CreateCollectionArgument, CreateCollectionCommand, CreateIndexesArgument,
    CreateIndexesCommand, DeleteArgument, DeleteCommand, DeleteStatement, DropCollectionArgument,
    DropCollectionCommand, DropDatabaseCommand, DropIndexesArgument, DropIndexesCommand,
    IndexSelector, InsertArgument, InsertCommand, RenameCollectionArgument,
    RenameCollectionCommand, Request, UpdateArgument, UpdateCommand, UpdateResult,
    UpdateStatement, Upserted, WriteError,
};
pub use database::Database;
pub use error::{CommandError, CommandResult, CoreError, CoreResult, ErrorCode};
pub use transaction::{TransactionState, WriteTransaction};
pub use types::{is_indexes_collection, Namespace, TransactionId, INDEXES_COLLECTION};
