//! Translation of oplog operations into store writes.

use crate::commands::{
    index_catalog_entry, ReplCommandArg, ReplCommandExecutor, ReplCommandLibrary,
};
use crate::context::ApplierContext;
use crate::error::{ApplyingError, ApplyingResult};
use replidb_core::{
    is_indexes_collection, Command, CommandError, CommandResult, CreateIndexesArgument,
    DeleteArgument, DeleteCommand, DeleteStatement, ErrorCode, InsertArgument, InsertCommand,
    Request, UpdateArgument, UpdateCommand, UpdateStatement, WriteTransaction,
};
use replidb_document::{Document, ID_KEY};
use replidb_oplog::{Operation, OperationKind};
use tracing::{debug, info, warn};

/// Applies oplog operations to a write transaction.
///
/// The applier keeps no state between calls. It never commits: every
/// effect stays inside the transaction it is given, and the caller decides
/// whether to commit or abort.
///
/// Every write is issued with an internal request, so it is accepted even
/// when the database is a replica.
#[derive(Debug, Clone, Default)]
pub struct OplogOperationApplier {
    library: ReplCommandLibrary,
    executor: ReplCommandExecutor,
}

impl OplogOperationApplier {
    /// Creates an applier with the default command library.
    pub fn new() -> Self {
        Self::with_library(ReplCommandLibrary::new())
    }

    /// Creates an applier resolving commands against `library`.
    pub fn with_library(library: ReplCommandLibrary) -> Self {
        Self {
            library,
            executor: ReplCommandExecutor::new(),
        }
    }

    /// Applies one operation within `txn`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplyingError`] wrapping the cause when the operation
    /// cannot be applied. Misses that are expected when an operation is
    /// replayed are logged, not reported.
    pub fn apply(
        &self,
        op: &Operation,
        txn: &mut WriteTransaction<'_>,
        ctx: &ApplierContext,
    ) -> ApplyingResult<()> {
        match &op.kind {
            OperationKind::Db => {
                debug!(optime = %op.optime, "ignoring a db operation");
                Ok(())
            }
            OperationKind::Noop => {
                debug!(optime = %op.optime, "ignoring a noop operation");
                Ok(())
            }
            OperationKind::Insert { document } if is_indexes_collection(&op.collection) => {
                self.insert_index(op, document, txn)
            }
            OperationKind::Insert { document } => self.insert_document(op, document, txn),
            OperationKind::Update {
                filter,
                modification,
                upsert,
            } => self.update(op, filter, modification, *upsert, txn, ctx),
            OperationKind::Delete { filter, just_one } => {
                self.delete(op, filter, *just_one, txn, ctx)
            }
            OperationKind::Command { request } => self.command(op, request, txn),
        }
    }

    fn insert_index(
        &self,
        op: &Operation,
        entry: &Document,
        txn: &mut WriteTransaction<'_>,
    ) -> ApplyingResult<()> {
        let (ns, spec) =
            index_catalog_entry(entry).map_err(|e| ApplyingError::InvalidIndexSpec(e.message))?;
        debug!(ns = %ns, index = %spec.name, "replicating index creation");
        let arg = ReplCommandArg::CreateIndexes(CreateIndexesArgument::new(ns.collection, vec![spec]));
        self.execute_repl_command(&op.database, arg, txn)?;
        Ok(())
    }

    /// Inserts are replayed as delete-by-identity followed by insert.
    ///
    /// Assumes replication is the only writer of the collection. Without an
    /// `_id` the document itself is the delete filter, so it removes the
    /// first stored document holding all of its fields, which may carry
    /// more.
    fn insert_document(
        &self,
        op: &Operation,
        document: &Document,
        txn: &mut WriteTransaction<'_>,
    ) -> ApplyingResult<()> {
        let identity = match document.id() {
            Some(id) => Document::with(ID_KEY, id.clone()),
            None => document.clone(),
        };

        self.execute_store_command(
            &op.database,
            &DeleteCommand,
            DeleteArgument::new(
                op.collection.as_str(),
                vec![DeleteStatement::new(identity, true)],
            ),
            txn,
        )?;
        self.execute_store_command(
            &op.database,
            &InsertCommand,
            InsertArgument::new(op.collection.as_str(), vec![document.clone()]),
            txn,
        )?;
        Ok(())
    }

    fn update(
        &self,
        op: &Operation,
        filter: &Document,
        modification: &Document,
        source_upsert: bool,
        txn: &mut WriteTransaction<'_>,
        ctx: &ApplierContext,
    ) -> ApplyingResult<()> {
        let upsert = source_upsert || ctx.treat_update_as_upsert();
        let result = self.execute_store_command(
            &op.database,
            &UpdateCommand,
            UpdateArgument::new(
                op.collection.as_str(),
                vec![UpdateStatement::new(
                    filter.clone(),
                    modification.clone(),
                    upsert,
                    true,
                )],
            ),
            txn,
        )?;

        if let Some(message) = result.error_message() {
            return Err(CommandError::new(ErrorCode::Unknown, message).into());
        }

        if !upsert && result.modified == 0 {
            info!(
                optime = %op.optime,
                hash = op.hash,
                filter = %filter,
                "oplog update operation did not find the doc to modify"
            );
        }
        if upsert && !result.upserted.is_empty() {
            warn!(op = %op, "replication couldn't find doc for op");
        }
        Ok(())
    }

    fn delete(
        &self,
        op: &Operation,
        filter: &Document,
        just_one: bool,
        txn: &mut WriteTransaction<'_>,
        ctx: &ApplierContext,
    ) -> ApplyingResult<()> {
        let deleted = self.execute_store_command(
            &op.database,
            &DeleteCommand,
            DeleteArgument::new(
                op.collection.as_str(),
                vec![DeleteStatement::new(filter.clone(), just_one)],
            ),
            txn,
        )?;

        if deleted == 0 && ctx.treat_update_as_upsert() {
            info!(
                optime = %op.optime,
                hash = op.hash,
                filter = %filter,
                "oplog delete operation did not find the doc to delete"
            );
        }
        Ok(())
    }

    fn command(
        &self,
        op: &Operation,
        request: &Document,
        txn: &mut WriteTransaction<'_>,
    ) -> ApplyingResult<()> {
        let entry = self
            .library
            .find(request)
            .ok_or_else(|| ApplyingError::command_not_found(request.first_key()))?;
        let arg = entry.command.unmarshal(request, entry.alias)?;
        debug!(command = entry.command.name(), db = %op.database, "replicating command");
        self.execute_repl_command(&op.database, arg, txn)?;
        Ok(())
    }

    fn execute_repl_command(
        &self,
        database: &str,
        arg: ReplCommandArg,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<()> {
        let request = Request::internal(database);
        self.executor.execute(&request, arg, txn)
    }

    fn execute_store_command<C: Command>(
        &self,
        database: &str,
        command: &C,
        arg: C::Arg,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<C::Reply> {
        let request = Request::internal(database);
        txn.execute(&request, command, arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_core::{Database, IndexSpec, Namespace};
    use replidb_document::{doc, Value};
    use replidb_oplog::OpTime;

    fn apply_all(db: &Database, ops: &[Operation], ctx: ApplierContext) -> ApplyingResult<()> {
        let applier = OplogOperationApplier::new();
        for op in ops {
            let mut txn = db.begin_write();
            applier.apply(op, &mut txn, &ctx)?;
            txn.commit()?;
        }
        Ok(())
    }

    fn orders() -> Namespace {
        Namespace::new("shop", "orders")
    }

    fn at(inc: u32) -> OpTime {
        OpTime::new(1, inc)
    }

    #[test]
    fn insert_is_idempotent() {
        let db = Database::replica();
        let op = Operation::insert(at(1), "shop", "orders", doc! { "_id" => 1, "total" => 5 });

        apply_all(&db, &[op.clone(), op], ApplierContext::default()).unwrap();
        assert_eq!(db.documents(&orders()), vec![doc! { "_id" => 1, "total" => 5 }]);
    }

    #[test]
    fn insert_without_id_matches_whole_document() {
        let db = Database::replica();
        let op = Operation::insert(at(1), "shop", "orders", doc! { "sku" => "a" });

        apply_all(&db, &[op.clone(), op], ApplierContext::default()).unwrap();
        assert_eq!(db.count(&orders()), 1);
    }

    #[test]
    fn insert_without_id_replaces_a_superset_document() {
        let db = Database::replica();
        let ops = [
            Operation::insert(at(1), "shop", "orders", doc! { "_id" => 9, "sku" => "a", "qty" => 2 }),
            Operation::insert(at(2), "shop", "orders", doc! { "sku" => "a" }),
        ];
        apply_all(&db, &ops, ApplierContext::default()).unwrap();

        let docs = db.documents(&orders());
        assert_eq!(docs.len(), 1);
        assert_ne!(docs[0].id(), Some(&Value::Integer(9)));
        assert_eq!(docs[0].get("qty"), None);
    }

    #[test]
    fn insert_replaces_stale_copy() {
        let db = Database::replica();
        let ops = [
            Operation::insert(at(1), "shop", "orders", doc! { "_id" => 1, "v" => 1 }),
            Operation::insert(at(2), "shop", "orders", doc! { "_id" => 1, "v" => 2 }),
        ];
        apply_all(&db, &ops, ApplierContext::default()).unwrap();
        assert_eq!(db.documents(&orders()), vec![doc! { "_id" => 1, "v" => 2 }]);
    }

    #[test]
    fn insert_into_index_catalog_creates_index() {
        let db = Database::replica();
        let op = Operation::insert(
            at(1),
            "shop",
            "system.indexes",
            doc! { "ns" => "shop.orders", "key" => doc! { "sku" => 1 }, "name" => "sku_1" },
        );
        apply_all(&db, &[op], ApplierContext::default()).unwrap();

        let indexes = db.indexes(&orders());
        assert!(indexes.contains(&IndexSpec::new("sku_1", doc! { "sku" => 1 }, false)));
        assert_eq!(db.count(&Namespace::new("shop", "system.indexes")), 0);
    }

    #[test]
    fn bad_index_catalog_entry_is_invalid_index_spec() {
        let db = Database::replica();
        let op = Operation::insert(at(1), "shop", "system.indexes", doc! { "name" => "x" });
        let err = apply_all(&db, &[op], ApplierContext::default()).unwrap_err();
        assert!(matches!(err, ApplyingError::InvalidIndexSpec(_)));
    }

    #[test]
    fn update_miss_is_tolerated_without_upsert() {
        let db = Database::replica();
        let op = Operation::update(
            at(1),
            "shop",
            "orders",
            doc! { "_id" => 1 },
            doc! { "$set" => doc! { "v" => 1 } },
            false,
        );
        apply_all(&db, &[op], ApplierContext::new(false)).unwrap();
        assert_eq!(db.count(&orders()), 0);
        assert!(db.database_names().is_empty());
    }

    #[test]
    fn update_miss_becomes_upsert_in_catch_up_mode() {
        let db = Database::replica();
        let op = Operation::update(
            at(1),
            "shop",
            "orders",
            doc! { "_id" => 1 },
            doc! { "$set" => doc! { "v" => 1 } },
            false,
        );
        apply_all(&db, &[op], ApplierContext::new(true)).unwrap();
        assert_eq!(db.documents(&orders()), vec![doc! { "_id" => 1, "v" => 1 }]);
    }

    #[test]
    fn update_write_error_fails_with_unknown() {
        let db = Database::replica();
        let ops = [
            Operation::insert(at(1), "shop", "orders", doc! { "_id" => 1, "n" => "x" }),
            Operation::update(
                at(2),
                "shop",
                "orders",
                doc! { "_id" => 1 },
                doc! { "$inc" => doc! { "n" => 1 } },
                false,
            ),
        ];
        let err = apply_all(&db, &ops, ApplierContext::default()).unwrap_err();
        match err {
            ApplyingError::Command(e) => assert_eq!(e.code, ErrorCode::Unknown),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn delete_respects_just_one() {
        let db = Database::replica();
        let mut ops = vec![];
        for id in 1..=3 {
            ops.push(Operation::insert(at(id as u32), "shop", "orders", doc! { "_id" => id, "g" => 1 }));
        }
        ops.push(Operation::delete(at(10), "shop", "orders", doc! { "g" => 1 }, true));
        apply_all(&db, &ops, ApplierContext::default()).unwrap();
        assert_eq!(db.count(&orders()), 2);

        let all = Operation::delete(at(11), "shop", "orders", doc! { "g" => 1 }, false);
        apply_all(&db, &[all.clone(), all], ApplierContext::new(true)).unwrap();
        assert_eq!(db.count(&orders()), 0);
    }

    #[test]
    fn unknown_commands_are_classified() {
        let db = Database::replica();
        let empty = Operation::command(at(1), "shop", Document::new());
        let err = apply_all(&db, &[empty], ApplierContext::default()).unwrap_err();
        assert!(matches!(err, ApplyingError::CommandNotFound(ref name) if name == "?"));

        let unknown = Operation::command(at(2), "shop", doc! { "fooBar" => 1 });
        let err = apply_all(&db, &[unknown], ApplierContext::default()).unwrap_err();
        assert!(matches!(err, ApplyingError::CommandNotFound(ref name) if name == "fooBar"));
    }

    #[test]
    fn malformed_command_argument_is_command_error() {
        let db = Database::replica();
        let op = Operation::command(at(1), "shop", doc! { "create" => 7 });
        let err = apply_all(&db, &[op], ApplierContext::default()).unwrap_err();
        assert!(matches!(err, ApplyingError::Command(ref e) if e.code == ErrorCode::TypeMismatch));
    }

    #[test]
    fn commands_replay_against_replica() {
        let db = Database::replica();
        let ops = [
            Operation::command(at(1), "shop", doc! { "create" => "orders" }),
            Operation::command(
                at(2),
                "shop",
                doc! {
                    "createIndexes" => "orders",
                    "indexes" => vec![Value::from(doc! { "key" => doc! { "sku" => 1 } })],
                },
            ),
            Operation::command(
                at(3),
                "shop",
                doc! { "renameCollection" => "shop.orders", "to" => "shop.archive" },
            ),
        ];
        apply_all(&db, &ops, ApplierContext::default()).unwrap();
        assert_eq!(db.collection_names("shop"), vec!["archive".to_string()]);
        assert_eq!(db.indexes(&Namespace::new("shop", "archive")).len(), 2);

        let drop_db = Operation::command(at(4), "shop", doc! { "dropDatabase" => 1 });
        apply_all(&db, &[drop_db], ApplierContext::default()).unwrap();
        assert!(db.database_names().is_empty());
    }

    #[test]
    fn db_and_noop_change_nothing() {
        let db = Database::replica();
        let ops = [
            Operation::noop(at(1)),
            Operation::new(at(2), 0, "shop", "", OperationKind::Db),
        ];
        apply_all(&db, &ops, ApplierContext::default()).unwrap();
        assert!(db.database_names().is_empty());
    }

    #[test]
    fn apply_never_commits() {
        let db = Database::replica();
        let applier = OplogOperationApplier::new();
        {
            let mut txn = db.begin_write();
            let op = Operation::insert(at(1), "shop", "orders", doc! { "_id" => 1 });
            applier.apply(&op, &mut txn, &ApplierContext::default()).unwrap();
        }
        assert_eq!(db.count(&orders()), 0);
    }
}
