//! Catalog commands: collections and indexes.

use super::{validate_collection_name, Command, Request};
use crate::catalog::IndexSpec;
use crate::error::{CommandError, CommandResult, ErrorCode};
use crate::transaction::WriteTransaction;
use crate::types::Namespace;
use replidb_document::Document;
use tracing::debug;

/// Creates an empty collection.
///
/// Fails with `NamespaceExists` if the collection already exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateCollectionCommand;

/// Argument of [`CreateCollectionCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCollectionArgument {
    /// Collection to create.
    pub collection: String,
}

impl CreateCollectionArgument {
    /// Creates the argument.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }
}

impl Command for CreateCollectionCommand {
    type Arg = CreateCollectionArgument;
    type Reply = ();

    fn name(&self) -> &'static str {
        "create"
    }

    fn run(
        &self,
        request: &Request,
        arg: CreateCollectionArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<()> {
        validate_collection_name(&arg.collection)?;
        let ns = Namespace::new(request.database.as_str(), arg.collection);
        if !txn.working_mut().create_collection(&ns) {
            return Err(CommandError::new(
                ErrorCode::NamespaceExists,
                format!("collection already exists: {ns}"),
            ));
        }
        Ok(())
    }
}

/// Builds indexes on a collection, creating the collection if needed.
///
/// Replies with the number of indexes actually created; specs identical to
/// an existing index are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateIndexesCommand;

/// Argument of [`CreateIndexesCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndexesArgument {
    /// Target collection.
    pub collection: String,
    /// Indexes to build.
    pub indexes: Vec<IndexSpec>,
}

impl CreateIndexesArgument {
    /// Creates the argument.
    pub fn new(collection: impl Into<String>, indexes: Vec<IndexSpec>) -> Self {
        Self {
            collection: collection.into(),
            indexes,
        }
    }
}

impl Command for CreateIndexesCommand {
    type Arg = CreateIndexesArgument;
    type Reply = usize;

    fn name(&self) -> &'static str {
        "createIndexes"
    }

    fn run(
        &self,
        request: &Request,
        arg: CreateIndexesArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<usize> {
        validate_collection_name(&arg.collection)?;
        let ns = Namespace::new(request.database.as_str(), arg.collection);
        let collection = txn.working_mut().collection_or_create(&ns);

        let mut created = 0;
        for spec in arg.indexes {
            if spec.name.is_empty() || spec.key.is_empty() {
                return Err(CommandError::bad_value(format!(
                    "index on {ns} needs a name and a non-empty key"
                )));
            }
            if collection.add_index(spec)? {
                created += 1;
            }
        }
        debug!(ns = %ns, created, "indexes created");
        Ok(created)
    }
}

/// Drops a collection and its indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropCollectionCommand;

/// Argument of [`DropCollectionCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropCollectionArgument {
    /// Collection to drop.
    pub collection: String,
}

impl DropCollectionArgument {
    /// Creates the argument.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }
}

impl Command for DropCollectionCommand {
    type Arg = DropCollectionArgument;
    type Reply = ();

    fn name(&self) -> &'static str {
        "drop"
    }

    fn run(
        &self,
        request: &Request,
        arg: DropCollectionArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<()> {
        let ns = Namespace::new(request.database.as_str(), arg.collection);
        txn.working_mut()
            .remove_collection(&ns)
            .map(|_| ())
            .ok_or_else(|| CommandError::namespace_not_found(&ns))
    }
}

/// Drops the request's database. Replies with the number of collections
/// removed; dropping a missing database removes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropDatabaseCommand;

impl Command for DropDatabaseCommand {
    type Arg = ();
    type Reply = usize;

    fn name(&self) -> &'static str {
        "dropDatabase"
    }

    fn run(
        &self,
        request: &Request,
        _arg: (),
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<usize> {
        Ok(txn.working_mut().remove_database(&request.database))
    }
}

/// Which indexes [`DropIndexesCommand`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelector {
    /// Every index except `_id_`.
    All,
    /// One index by name.
    Name(String),
    /// One index by key pattern.
    Key(Document),
}

/// Argument of [`DropIndexesCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropIndexesArgument {
    /// Target collection.
    pub collection: String,
    /// Indexes to drop.
    pub selector: IndexSelector,
}

impl DropIndexesArgument {
    /// Creates the argument.
    pub fn new(collection: impl Into<String>, selector: IndexSelector) -> Self {
        Self {
            collection: collection.into(),
            selector,
        }
    }
}

/// Drops indexes. Replies with the number of indexes removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropIndexesCommand;

impl Command for DropIndexesCommand {
    type Arg = DropIndexesArgument;
    type Reply = usize;

    fn name(&self) -> &'static str {
        "dropIndexes"
    }

    fn run(
        &self,
        request: &Request,
        arg: DropIndexesArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<usize> {
        let ns = Namespace::new(request.database.as_str(), arg.collection);
        let collection = txn
            .working_mut()
            .collection_mut(&ns)
            .ok_or_else(|| CommandError::namespace_not_found(&ns))?;

        match arg.selector {
            IndexSelector::All => Ok(collection.drop_all_indexes()),
            IndexSelector::Name(name) => collection.drop_index(&name).map(|()| 1),
            IndexSelector::Key(key) => {
                let name = collection.index_name_by_key(&key).ok_or_else(|| {
                    CommandError::new(
                        ErrorCode::IndexNotFound,
                        format!("can't find index with key: {key}"),
                    )
                })?;
                collection.drop_index(&name).map(|()| 1)
            }
        }
    }
}

/// Argument of [`RenameCollectionCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCollectionArgument {
    /// Source namespace.
    pub from: Namespace,
    /// Target namespace; may be in another database.
    pub to: Namespace,
    /// Replace an existing target instead of failing.
    pub drop_target: bool,
}

impl RenameCollectionArgument {
    /// Creates the argument.
    pub fn new(from: Namespace, to: Namespace, drop_target: bool) -> Self {
        Self {
            from,
            to,
            drop_target,
        }
    }
}

/// Moves a collection, with its documents and indexes, to a new namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenameCollectionCommand;

impl Command for RenameCollectionCommand {
    type Arg = RenameCollectionArgument;
    type Reply = ();

    fn name(&self) -> &'static str {
        "renameCollection"
    }

    fn run(
        &self,
        _request: &Request,
        arg: RenameCollectionArgument,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<()> {
        validate_collection_name(&arg.to.collection)?;
        if arg.from == arg.to {
            return Err(CommandError::new(
                ErrorCode::IllegalOperation,
                format!("cannot rename {} to itself", arg.from),
            ));
        }
        let state = txn.working_mut();
        if state.collection(&arg.from).is_none() {
            return Err(CommandError::namespace_not_found(&arg.from));
        }
        if state.collection(&arg.to).is_some() {
            if !arg.drop_target {
                return Err(CommandError::new(
                    ErrorCode::NamespaceExists,
                    format!("target namespace exists: {}", arg.to),
                ));
            }
            state.remove_collection(&arg.to);
        }
        if let Some(collection) = state.remove_collection(&arg.from) {
            state.put_collection(&arg.to, collection);
        }
        Ok(())
    }
}
