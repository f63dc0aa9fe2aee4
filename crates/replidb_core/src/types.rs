//! Core type definitions for ReplIDB.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Collection that holds index specifications in the legacy catalog layout.
pub const INDEXES_COLLECTION: &str = "system.indexes";

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// A `database.collection` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace {
    /// Database name.
    pub database: String,
    /// Collection name (may itself contain dots).
    pub collection: String,
}

impl Namespace {
    /// Creates a namespace from its parts.
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// Parses `db.collection`, splitting at the first dot.
    ///
    /// # Errors
    ///
    /// Fails if either part is empty or there is no dot.
    pub fn parse(namespace: &str) -> CoreResult<Self> {
        match namespace.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(CoreError::invalid_namespace(namespace)),
        }
    }

    /// Returns true if this is the reserved index-metadata collection.
    pub fn is_indexes_collection(&self) -> bool {
        is_indexes_collection(&self.collection)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Returns true if the collection name is the reserved index-metadata
/// collection.
pub fn is_indexes_collection(collection: &str) -> bool {
    collection == INDEXES_COLLECTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_at_first_dot() {
        let ns = Namespace::parse("shop.orders.archive").unwrap();
        assert_eq!(ns.database, "shop");
        assert_eq!(ns.collection, "orders.archive");
        assert_eq!(ns.to_string(), "shop.orders.archive");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Namespace::parse("nodot").is_err());
        assert!(Namespace::parse(".coll").is_err());
        assert!(Namespace::parse("db.").is_err());
    }

    #[test]
    fn indexes_collection() {
        assert!(Namespace::new("db", "system.indexes").is_indexes_collection());
        assert!(!Namespace::new("db", "indexes").is_indexes_collection());
    }

    #[test]
    fn transaction_id_display() {
        assert_eq!(TransactionId::new(7).to_string(), "txn:7");
        assert_eq!(TransactionId::new(7).as_u64(), 7);
    }
}
