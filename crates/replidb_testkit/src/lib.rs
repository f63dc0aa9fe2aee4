//! # ReplIDB Testkit
//!
//! Test utilities for ReplIDB.
//!
//! This crate provides:
//! - A recording [`SyncServiceView`](replidb_repl::SyncServiceView) with
//!   scripted delivery failures
//! - A scripted fetch source
//! - Oplog dump files for CLI tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replidb_testkit::prelude::*;
//!
//! #[test]
//! fn loop_delivers_everything() {
//!     let view = Arc::new(RecordingView::new());
//!     let fetcher = ScriptedFetcher::new(vec![Ok(batch(insert_ops("app", "c", 3), true))]);
//!     SyncFetcher::new(view.clone(), fetcher).run();
//!     assert_eq!(view.delivered().len(), 3);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
