//! Write transactions.

use crate::catalog::StoreState;
use crate::command::{Command, Request};
use crate::database::Database;
use crate::error::{CommandError, CommandResult, CoreError, CoreResult, ErrorCode};
use crate::query;
use crate::types::{Namespace, TransactionId};
use parking_lot::MutexGuard;
use replidb_document::Document;
use tracing::{debug, trace};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// An exclusive write transaction.
///
/// Only one write transaction exists at a time: the database's write lock
/// is held for the transaction's lifetime. Changes go to a private working
/// copy of the catalog and become visible to readers on [`commit`].
/// Dropping an active transaction aborts it.
///
/// [`commit`]: WriteTransaction::commit
pub struct WriteTransaction<'db> {
    id: TransactionId,
    db: &'db Database,
    working: StoreState,
    state: TransactionState,
    _guard: MutexGuard<'db, ()>,
}

impl<'db> WriteTransaction<'db> {
    pub(crate) fn new(
        id: TransactionId,
        db: &'db Database,
        working: StoreState,
        guard: MutexGuard<'db, ()>,
    ) -> Self {
        Self {
            id,
            db,
            working,
            state: TransactionState::Active,
            _guard: guard,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Executes a command within this transaction.
    ///
    /// Requests that are not internal are rejected with
    /// `NotWritablePrimary` when the database is a replica: only the
    /// replication machinery may write to a replica.
    pub fn execute<C: Command>(
        &mut self,
        request: &Request,
        command: &C,
        arg: C::Arg,
    ) -> CommandResult<C::Reply> {
        if !self.is_active() {
            return Err(CommandError::new(
                ErrorCode::IllegalOperation,
                format!("{} is not active", self.id),
            ));
        }
        if self.db.is_replica() && !request.from_internal {
            return Err(CommandError::new(
                ErrorCode::NotWritablePrimary,
                format!("not primary: {} rejected on {}", command.name(), request.database),
            ));
        }
        trace!(txn = %self.id, command = command.name(), db = %request.database, "executing command");
        command.run(request, arg, self)
    }

    /// Finds the documents of a collection matching `filter`, as seen by
    /// this transaction.
    pub fn find(&self, ns: &Namespace, filter: &Document) -> CommandResult<Vec<Document>> {
        find_in(&self.working, ns, filter)
    }

    /// Returns true if the collection exists, as seen by this transaction.
    pub fn has_collection(&self, ns: &Namespace) -> bool {
        self.working.collection(ns).is_some()
    }

    /// Commits the transaction, publishing its changes.
    pub fn commit(mut self) -> CoreResult<()> {
        self.ensure_active()?;
        let working = std::mem::take(&mut self.working);
        self.db.publish(working);
        self.state = TransactionState::Committed;
        debug!(txn = %self.id, "transaction committed");
        Ok(())
    }

    /// Aborts the transaction, discarding its changes.
    pub fn abort(mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::Aborted;
        debug!(txn = %self.id, "transaction aborted");
        Ok(())
    }

    pub(crate) fn working_mut(&mut self) -> &mut StoreState {
        &mut self.working
    }

    fn ensure_active(&self) -> CoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            TransactionState::Aborted => {
                Err(CoreError::invalid_operation("transaction already aborted"))
            }
        }
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            debug!(txn = %self.id, "transaction dropped while active, discarding changes");
        }
    }
}

pub(crate) fn find_in(
    state: &StoreState,
    ns: &Namespace,
    filter: &Document,
) -> CommandResult<Vec<Document>> {
    let Some(collection) = state.collection(ns) else {
        return Ok(Vec::new());
    };
    let mut found = Vec::new();
    for doc in collection.documents() {
        if query::matches(doc, filter)? {
            found.push(doc.clone());
        }
    }
    Ok(found)
}
