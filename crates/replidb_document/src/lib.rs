//! # ReplIDB Document
//!
//! Document value model for ReplIDB.
//!
//! This crate provides:
//! - `Value`, the dynamic value carried by documents
//! - `Document`, an ordered, key-unique map of fields
//! - Dotted-path access (`a.b.c`)
//! - serde support (JSON objects keep their key order)
//!
//! ## Usage
//!
//! ```
//! use replidb_document::{doc, Document, Value};
//!
//! let mut d = doc! { "_id" => 1, "name" => "alice" };
//! d.set_path("address.city", Value::from("Lisbon")).unwrap();
//!
//! assert_eq!(d.get_path("address.city"), Some(&Value::from("Lisbon")));
//! assert_eq!(d.first_key(), Some("_id"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod value;

pub use document::{Document, ID_KEY};
pub use error::{DocumentError, DocumentResult};
pub use value::Value;
