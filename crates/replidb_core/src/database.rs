//! Database handle.

use crate::catalog::{IndexSpec, StoreState};
use crate::error::CommandResult;
use crate::transaction::{find_in, WriteTransaction};
use crate::types::{Namespace, TransactionId};
use parking_lot::{Mutex, RwLock};
use replidb_document::Document;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory transactional document database.
///
/// The database provides:
/// - Single-writer concurrency control via `begin_write()`
/// - Readers that always see the last committed state
/// - A replica mode in which user-originated writes are rejected
///
/// ## Single-Writer Guarantee
///
/// Only one write transaction can be active at a time. `begin_write()`
/// acquires an exclusive lock that is held for the transaction's lifetime.
pub struct Database {
    committed: RwLock<StoreState>,
    write_lock: Mutex<()>,
    next_txid: AtomicU64,
    replica: bool,
}

impl Database {
    /// Creates an empty database that accepts writes from any request.
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// Creates an empty replica database.
    ///
    /// A replica only accepts writes from internal requests.
    pub fn replica() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(replica: bool) -> Self {
        Self {
            committed: RwLock::new(StoreState::default()),
            write_lock: Mutex::new(()),
            next_txid: AtomicU64::new(1),
            replica,
        }
    }

    /// Returns true if this database is a replica.
    pub fn is_replica(&self) -> bool {
        self.replica
    }

    /// Begins a new write transaction with exclusive write lock.
    ///
    /// This blocks while another write transaction is alive.
    ///
    /// The working state is a full copy of the committed state, so each
    /// transaction costs time proportional to the store size. Applying N
    /// operations one transaction at a time is quadratic; this store is
    /// meant for tests and dump replays, not large data sets.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let guard = self.write_lock.lock();
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let working = self.committed.read().clone();
        WriteTransaction::new(id, self, working, guard)
    }

    pub(crate) fn publish(&self, state: StoreState) {
        *self.committed.write() = state;
    }

    /// Finds committed documents of a collection matching `filter`.
    pub fn find(&self, ns: &Namespace, filter: &Document) -> CommandResult<Vec<Document>> {
        find_in(&self.committed.read(), ns, filter)
    }

    /// Returns all committed documents of a collection in natural order.
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.committed
            .read()
            .collection(ns)
            .map(|c| c.documents().to_vec())
            .unwrap_or_default()
    }

    /// Counts committed documents of a collection.
    pub fn count(&self, ns: &Namespace) -> usize {
        self.committed
            .read()
            .collection(ns)
            .map(|c| c.documents().len())
            .unwrap_or(0)
    }

    /// Returns the indexes of a collection.
    pub fn indexes(&self, ns: &Namespace) -> Vec<IndexSpec> {
        self.committed
            .read()
            .collection(ns)
            .map(|c| c.indexes().to_vec())
            .unwrap_or_default()
    }

    /// Returns true if the collection exists.
    pub fn has_collection(&self, ns: &Namespace) -> bool {
        self.committed.read().collection(ns).is_some()
    }

    /// Returns the names of all databases.
    pub fn database_names(&self) -> Vec<String> {
        self.committed.read().database_names()
    }

    /// Returns the collection names of a database.
    pub fn collection_names(&self, database: &str) -> Vec<String> {
        self.committed.read().collection_names(database)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
