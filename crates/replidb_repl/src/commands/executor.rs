//! Execution of replicated commands.

use super::{ReplCommand, ReplCommandArg};
use replidb_core::{
    CommandResult, CreateCollectionCommand, CreateIndexesCommand, DropCollectionCommand,
    DropDatabaseCommand, DropIndexesCommand, ErrorCode, RenameCollectionCommand, Request,
    WriteTransaction,
};
use tracing::debug;

/// Runs replicated commands against a write transaction.
///
/// Replays must be idempotent, so outcomes that only mean "already done"
/// are accepted: creating an existing collection, dropping a missing
/// collection or index, and renaming a collection that was already moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplCommandExecutor;

impl ReplCommandExecutor {
    /// Creates an executor.
    pub fn new() -> Self {
        Self
    }

    /// Executes `arg` within `txn`.
    ///
    /// # Errors
    ///
    /// Returns the not-ok status of the underlying store command.
    pub fn execute(
        &self,
        request: &Request,
        arg: ReplCommandArg,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<()> {
        let command = arg.command();
        let outcome = match arg {
            ReplCommandArg::Create(arg) => txn.execute(request, &CreateCollectionCommand, arg),
            ReplCommandArg::CreateIndexes(arg) => txn
                .execute(request, &CreateIndexesCommand, arg)
                .map(|created| debug!(created, "replicated createIndexes")),
            ReplCommandArg::Drop(arg) => txn.execute(request, &DropCollectionCommand, arg),
            ReplCommandArg::DropDatabase => txn
                .execute(request, &DropDatabaseCommand, ())
                .map(|dropped| debug!(dropped, db = %request.database, "replicated dropDatabase")),
            ReplCommandArg::DropIndexes(arg) => txn
                .execute(request, &DropIndexesCommand, arg)
                .map(|dropped| debug!(dropped, "replicated dropIndexes")),
            ReplCommandArg::RenameCollection(arg) => {
                let already_moved = !txn.has_collection(&arg.from) && txn.has_collection(&arg.to);
                if already_moved {
                    debug!(from = %arg.from, to = %arg.to, "rename already applied");
                    return Ok(());
                }
                txn.execute(request, &RenameCollectionCommand, arg)
            }
        };

        match outcome {
            Err(err) if is_already_done(command, err.code) => {
                debug!(command = command.name(), error = %err, "command already applied");
                Ok(())
            }
            other => other,
        }
    }
}

fn is_already_done(command: ReplCommand, code: ErrorCode) -> bool {
    matches!(
        (command, code),
        (ReplCommand::Create, ErrorCode::NamespaceExists)
            | (ReplCommand::Drop, ErrorCode::NamespaceNotFound)
            | (ReplCommand::DropIndexes, ErrorCode::NamespaceNotFound)
            | (ReplCommand::DropIndexes, ErrorCode::IndexNotFound)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_core::{
        CreateCollectionArgument, Database, DropCollectionArgument, DropIndexesArgument,
        IndexSelector, Namespace, RenameCollectionArgument,
    };

    fn run(db: &Database, args: Vec<ReplCommandArg>) -> CommandResult<()> {
        let mut txn = db.begin_write();
        for arg in args {
            ReplCommandExecutor::new().execute(&Request::internal("app"), arg, &mut txn)?;
        }
        txn.commit().map_err(|e| replidb_core::CommandError::new(ErrorCode::Unknown, e.to_string()))
    }

    #[test]
    fn replays_are_idempotent() {
        let db = Database::replica();
        let create = || ReplCommandArg::Create(CreateCollectionArgument::new("c"));
        run(&db, vec![create(), create()]).unwrap();
        assert!(db.has_collection(&Namespace::new("app", "c")));

        let drop_index = || {
            ReplCommandArg::DropIndexes(DropIndexesArgument::new(
                "c",
                IndexSelector::Name("missing".into()),
            ))
        };
        let drop = || ReplCommandArg::Drop(DropCollectionArgument::new("c"));
        run(&db, vec![drop_index(), drop(), drop(), drop_index()]).unwrap();
        assert!(!db.has_collection(&Namespace::new("app", "c")));
    }

    #[test]
    fn rename_replay_is_tolerated() {
        let db = Database::replica();
        let rename = || {
            ReplCommandArg::RenameCollection(RenameCollectionArgument::new(
                Namespace::new("app", "a"),
                Namespace::new("app", "b"),
                false,
            ))
        };
        run(
            &db,
            vec![ReplCommandArg::Create(CreateCollectionArgument::new("a")), rename(), rename()],
        )
        .unwrap();
        assert_eq!(db.collection_names("app"), vec!["b".to_string()]);

        // Neither side exists: a real failure.
        let err = run(&Database::replica(), vec![rename()]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NamespaceNotFound);
    }

    #[test]
    fn user_requests_are_rejected_on_replicas() {
        let db = Database::replica();
        let mut txn = db.begin_write();
        let err = ReplCommandExecutor::new()
            .execute(
                &Request::user("app"),
                ReplCommandArg::Create(CreateCollectionArgument::new("c")),
                &mut txn,
            )
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotWritablePrimary);
    }
}
