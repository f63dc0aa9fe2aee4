//! # ReplIDB Replication
//!
//! Oplog replication engine for ReplIDB.
//!
//! This crate provides:
//! - [`OplogOperationApplier`]: applies one oplog operation to a write
//!   transaction, idempotently
//! - A library of replayable commands and their executor
//! - [`SyncFetcher`]: the loop that moves fetched batches to a consumer
//! - [`SyncServiceView`]: the narrow contract between that loop and its
//!   consumer
//! - [`ReplicationService`]: a consumer that applies delivered operations
//!   to a [`replidb_core::Database`]
//!
//! # Architecture
//!
//! ```text
//! OplogFetcher ──fetch──▶ SyncFetcher ──deliver──▶ SyncServiceView
//!                              │                       │ (queue)
//!                     CancellationToken                ▼
//!                                            OplogOperationApplier
//!                                                      │
//!                                              WriteTransaction
//! ```
//!
//! The fetch loop classifies every failure as a [`ReplicationError`]:
//! interruptions and retries restart the iteration, a rollback or a fatal
//! error ends it. The view hears exactly one terminal notification per run.
//!
//! ## Usage
//!
//! ```
//! use replidb_core::{Database, Namespace};
//! use replidb_document::doc;
//! use replidb_oplog::{OpTime, Operation};
//! use replidb_repl::{RemoteOplog, RemoteOplogFetcher, ReplConfig, ReplicationService};
//! use std::sync::Arc;
//!
//! let log = Arc::new(RemoteOplog::new());
//! log.append(Operation::insert(OpTime::new(1, 1), "shop", "orders", doc! { "_id" => 1 }));
//! log.close();
//!
//! let db = Arc::new(Database::replica());
//! let service = ReplicationService::start(
//!     db.clone(),
//!     RemoteOplogFetcher::new(log),
//!     ReplConfig::default(),
//! )
//! .unwrap();
//! assert!(service.join().unwrap().is_finished());
//! assert_eq!(db.count(&Namespace::new("shop", "orders")), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod applier;
mod cancel;
pub mod commands;
mod config;
mod context;
mod error;
mod fetcher;
mod service;
mod source;
mod view;

pub use applier::OplogOperationApplier;
pub use cancel::CancellationToken;
pub use commands::{LibraryEntry, ReplCommand, ReplCommandArg, ReplCommandExecutor, ReplCommandLibrary};
pub use config::ReplConfig;
pub use context::ApplierContext;
pub use error::{ApplyingError, ApplyingResult, ReplResult, ReplicationError, RollbackCause};
pub use fetcher::{FetcherHandle, FetcherOutcome, FetcherStats, SyncFetcher};
pub use service::{ReplicationOutcome, ReplicationService};
pub use source::{OplogFetcher, RemoteOplog, RemoteOplogFetcher, DEFAULT_BATCH_SIZE};
pub use view::{FinishReason, SyncServiceView};
