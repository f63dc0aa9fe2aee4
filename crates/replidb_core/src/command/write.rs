//! Document write commands: insert, update and delete.

use super::{validate_collection_name, Command, Request};
use crate::catalog::Collection;
use crate::error::{CommandError, CommandResult};
use crate::query;
use crate::transaction::WriteTransaction;
use crate::types::Namespace;
use replidb_document::{Document, Value};

/// Inserts documents into a collection.
///
/// Documents without `_id` get a generated one. A duplicate key fails the
/// whole command.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertCommand;

/// Argument of [`InsertCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct InsertArgument {
    /// Target collection.
    pub collection: String,
    /// Documents to insert, in order.
    pub documents: Vec<Document>,
}

impl InsertArgument {
    /// Creates an insert argument.
    pub fn new(collection: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            collection: collection.into(),
            documents,
        }
    }
}

impl Command for InsertCommand {
    type Arg = InsertArgument;
    type Reply = u64;

    fn name(&self) -> &'static str {
        "insert"
    }

    fn run(
        &self,
        request: &Request,
        arg: InsertArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<u64> {
        validate_collection_name(&arg.collection)?;
        let ns = Namespace::new(request.database.as_str(), arg.collection);
        let collection = txn.working_mut().collection_or_create(&ns);

        let mut inserted = 0;
        for doc in arg.documents {
            let doc = query::with_id(doc);
            collection.check_unique(&doc, None)?;
            collection.documents_mut().push(doc);
            inserted += 1;
        }
        Ok(inserted)
    }
}

/// One update statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// Selects the documents to modify.
    pub filter: Document,
    /// Operator update or replacement document.
    pub modification: Document,
    /// Insert a new document when nothing matches.
    pub upsert: bool,
    /// Modify every match instead of the first one.
    pub multi: bool,
}

impl UpdateStatement {
    /// Creates an update statement.
    pub fn new(filter: Document, modification: Document, upsert: bool, multi: bool) -> Self {
        Self {
            filter,
            modification,
            upsert,
            multi,
        }
    }
}

/// Argument of [`UpdateCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateArgument {
    /// Target collection.
    pub collection: String,
    /// Statements, executed in order; execution stops at the first write
    /// error.
    pub statements: Vec<UpdateStatement>,
}

impl UpdateArgument {
    /// Creates an update argument.
    pub fn new(collection: impl Into<String>, statements: Vec<UpdateStatement>) -> Self {
        Self {
            collection: collection.into(),
            statements,
        }
    }
}

/// A document inserted by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// Index of the statement that produced it.
    pub index: usize,
    /// The inserted document's `_id`.
    pub id: Value,
}

/// A per-statement failure.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    /// Index of the failed statement.
    pub index: usize,
    /// The failure.
    pub error: CommandError,
}

/// Reply of [`UpdateCommand`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Documents matched by the filters.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// Documents inserted by upserts.
    pub upserted: Vec<Upserted>,
    /// Statement failures.
    pub write_errors: Vec<WriteError>,
}

impl UpdateResult {
    /// Returns true if no statement failed.
    pub fn is_ok(&self) -> bool {
        self.write_errors.is_empty()
    }

    /// Describes the first write error, if any.
    pub fn error_message(&self) -> Option<String> {
        self.write_errors
            .first()
            .map(|e| format!("statement {}: {}", e.index, e.error))
    }
}

/// Updates documents in a collection.
///
/// Statement-level failures (bad modifiers, type mismatches, duplicate
/// keys) are reported in [`UpdateResult::write_errors`]; the status itself
/// only fails for request-level problems.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateCommand;

impl Command for UpdateCommand {
    type Arg = UpdateArgument;
    type Reply = UpdateResult;

    fn name(&self) -> &'static str {
        "update"
    }

    fn run(
        &self,
        request: &Request,
        arg: UpdateArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<UpdateResult> {
        validate_collection_name(&arg.collection)?;
        let ns = Namespace::new(request.database.as_str(), arg.collection);

        let mut result = UpdateResult::default();
        for (index, statement) in arg.statements.iter().enumerate() {
            if let Err(error) = update_one_statement(txn, &ns, index, statement, &mut result) {
                result.write_errors.push(WriteError { index, error });
                break;
            }
        }
        Ok(result)
    }
}

fn update_one_statement(
    txn: &mut WriteTransaction<'_>,
    ns: &Namespace,
    index: usize,
    statement: &UpdateStatement,
    result: &mut UpdateResult,
) -> CommandResult<()> {
    let working = txn.working_mut();
    // A miss must not create the collection unless it upserts.
    if working.collection(ns).is_none() {
        if statement.upsert {
            upsert(working.collection_or_create(ns), index, statement, result)?;
        }
        return Ok(());
    }
    let collection = working.collection_or_create(ns);

    let mut positions = Vec::new();
    for (pos, doc) in collection.documents().iter().enumerate() {
        if query::matches(doc, &statement.filter)? {
            positions.push(pos);
            if !statement.multi {
                break;
            }
        }
    }

    if positions.is_empty() {
        if statement.upsert {
            upsert(collection, index, statement, result)?;
        }
        return Ok(());
    }

    for pos in positions {
        result.matched += 1;
        let current = &collection.documents()[pos];
        let updated = query::apply_modification(current, &statement.modification)?;
        if updated != *current {
            collection.check_unique(&updated, Some(pos))?;
            collection.documents_mut()[pos] = updated;
            result.modified += 1;
        }
    }
    Ok(())
}

fn upsert(
    collection: &mut Collection,
    index: usize,
    statement: &UpdateStatement,
    result: &mut UpdateResult,
) -> CommandResult<()> {
    let doc = query::upsert_document(&statement.filter, &statement.modification)?;
    collection.check_unique(&doc, None)?;
    let id = doc.id().cloned().unwrap_or(Value::Null);
    collection.documents_mut().push(doc);
    result.upserted.push(Upserted { index, id });
    Ok(())
}

/// One delete statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Selects the documents to delete.
    pub filter: Document,
    /// Delete at most one matching document.
    pub just_one: bool,
}

impl DeleteStatement {
    /// Creates a delete statement.
    pub fn new(filter: Document, just_one: bool) -> Self {
        Self { filter, just_one }
    }
}

/// Argument of [`DeleteCommand`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteArgument {
    /// Target collection.
    pub collection: String,
    /// Statements, executed in order.
    pub statements: Vec<DeleteStatement>,
}

impl DeleteArgument {
    /// Creates a delete argument.
    pub fn new(collection: impl Into<String>, statements: Vec<DeleteStatement>) -> Self {
        Self {
            collection: collection.into(),
            statements,
        }
    }
}

/// Deletes documents from a collection. Replies with the number deleted.
///
/// Deleting from a missing collection deletes nothing and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteCommand;

impl Command for DeleteCommand {
    type Arg = DeleteArgument;
    type Reply = u64;

    fn name(&self) -> &'static str {
        "delete"
    }

    fn run(
        &self,
        request: &Request,
        arg: DeleteArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<u64> {
        validate_collection_name(&arg.collection)?;
        let ns = Namespace::new(request.database.as_str(), arg.collection);
        let Some(collection) = txn.working_mut().collection_mut(&ns) else {
            return Ok(0);
        };

        let mut deleted = 0;
        for statement in &arg.statements {
            let mut doomed = Vec::new();
            for (pos, doc) in collection.documents().iter().enumerate() {
                if query::matches(doc, &statement.filter)? {
                    doomed.push(pos);
                    if statement.just_one {
                        break;
                    }
                }
            }
            for pos in doomed.iter().rev() {
                collection.documents_mut().remove(*pos);
            }
            deleted += doomed.len() as u64;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::error::ErrorCode;
    use replidb_document::doc;

    fn ns() -> Namespace {
        Namespace::new("app", "users")
    }

    fn seed(db: &Database, docs: Vec<Document>) {
        let mut txn = db.begin_write();
        txn.execute(&Request::user("app"), &InsertCommand, InsertArgument::new("users", docs))
            .unwrap();
        txn.commit().unwrap();
    }

    fn update(db: &Database, statement: UpdateStatement) -> UpdateResult {
        let mut txn = db.begin_write();
        let result = txn
            .execute(
                &Request::user("app"),
                &UpdateCommand,
                UpdateArgument::new("users", vec![statement]),
            )
            .unwrap();
        txn.commit().unwrap();
        result
    }

    #[test]
    fn insert_generates_id_and_rejects_duplicates() {
        let db = Database::new();
        seed(&db, vec![doc! { "name" => "anon" }, doc! { "_id" => 1 }]);

        let docs = db.documents(&ns());
        assert_eq!(docs[0].first_key(), Some("_id"));

        let mut txn = db.begin_write();
        let err = txn
            .execute(
                &Request::user("app"),
                &InsertCommand,
                InsertArgument::new("users", vec![doc! { "_id" => 1 }]),
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateKey);
    }

    #[test]
    fn update_multi_counts_matched_and_modified() {
        let db = Database::new();
        seed(
            &db,
            vec![
                doc! { "_id" => 1, "g" => "a", "v" => 1 },
                doc! { "_id" => 2, "g" => "a", "v" => 2 },
                doc! { "_id" => 3, "g" => "b", "v" => 1 },
            ],
        );

        let result = update(
            &db,
            UpdateStatement::new(
                doc! { "g" => "a" },
                doc! { "$set" => doc! { "v" => 1 } },
                false,
                true,
            ),
        );
        assert_eq!(result.matched, 2);
        assert_eq!(result.modified, 1);
        assert!(result.is_ok());
    }

    #[test]
    fn update_miss_without_upsert_changes_nothing() {
        let db = Database::new();
        seed(&db, vec![doc! { "_id" => 1 }]);

        let result = update(
            &db,
            UpdateStatement::new(doc! { "_id" => 2 }, doc! { "$set" => doc! { "v" => 1 } }, false, true),
        );
        assert_eq!(result.matched, 0);
        assert!(result.upserted.is_empty());
        assert_eq!(db.count(&ns()), 1);
    }

    #[test]
    fn update_miss_on_missing_collection_creates_nothing() {
        let db = Database::new();
        let result = update(
            &db,
            UpdateStatement::new(doc! { "_id" => 2 }, doc! { "$set" => doc! { "v" => 1 } }, false, true),
        );
        assert_eq!(result.matched, 0);
        assert!(!db.has_collection(&ns()));
        assert!(db.database_names().is_empty());
    }

    #[test]
    fn update_miss_with_upsert_inserts() {
        let db = Database::new();
        let result = update(
            &db,
            UpdateStatement::new(doc! { "_id" => 2 }, doc! { "$set" => doc! { "v" => 1 } }, true, true),
        );
        assert_eq!(result.upserted, vec![Upserted { index: 0, id: Value::Integer(2) }]);
        assert_eq!(db.documents(&ns()), vec![doc! { "_id" => 2, "v" => 1 }]);
    }

    #[test]
    fn bad_modifier_is_a_write_error_not_a_status() {
        let db = Database::new();
        seed(&db, vec![doc! { "_id" => 1, "n" => "x" }]);

        let result = update(
            &db,
            UpdateStatement::new(doc! { "_id" => 1 }, doc! { "$inc" => doc! { "n" => 1 } }, false, true),
        );
        assert!(!result.is_ok());
        assert_eq!(result.write_errors[0].error.code, ErrorCode::TypeMismatch);
        assert!(result.error_message().unwrap().contains("statement 0"));
    }

    #[test]
    fn delete_just_one_and_all() {
        let db = Database::new();
        seed(
            &db,
            vec![
                doc! { "_id" => 1, "g" => "a" },
                doc! { "_id" => 2, "g" => "a" },
                doc! { "_id" => 3, "g" => "a" },
            ],
        );

        let mut txn = db.begin_write();
        let one = txn
            .execute(
                &Request::user("app"),
                &DeleteCommand,
                DeleteArgument::new("users", vec![DeleteStatement::new(doc! { "g" => "a" }, true)]),
            )
            .unwrap();
        let rest = txn
            .execute(
                &Request::user("app"),
                &DeleteCommand,
                DeleteArgument::new("users", vec![DeleteStatement::new(doc! { "g" => "a" }, false)]),
            )
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(one, 1);
        assert_eq!(rest, 2);
        assert_eq!(db.count(&ns()), 0);
    }

    #[test]
    fn delete_from_missing_collection_is_noop() {
        let db = Database::new();
        let mut txn = db.begin_write();
        let deleted = txn
            .execute(
                &Request::user("app"),
                &DeleteCommand,
                DeleteArgument::new("ghost", vec![DeleteStatement::new(Document::new(), false)]),
            )
            .unwrap();
        assert_eq!(deleted, 0);
    }
}
