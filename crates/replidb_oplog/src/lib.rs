//! # ReplIDB Oplog
//!
//! Oplog operation model for ReplIDB.
//!
//! This crate provides:
//! - `Operation`, one record of a remote change log, with its
//!   kind-specific payload (`OperationKind`)
//! - `OpTime` positions
//! - `OplogBatch`, the unit a fetch returns
//! - Parsing of oplog entry documents (`ts`, `t`, `h`, `op`, `ns`, `o`,
//!   `o2`, `b`) into operations, and the inverse
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod operation;
mod optime;

pub use batch::OplogBatch;
pub use error::{OplogError, OplogResult};
pub use operation::{Operation, OperationKind};
pub use optime::{OpTime, Timestamp};
