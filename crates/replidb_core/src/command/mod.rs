//! Typed commands executed against a write transaction.
//!
//! A [`Command`] pairs a typed argument with a typed reply. Commands are
//! always run through [`WriteTransaction::execute`], which checks the
//! [`Request`] envelope before delegating to [`Command::run`].

mod admin;
mod write;

pub use admin::{
    CreateCollectionArgument, CreateCollectionCommand, CreateIndexesArgument,
    CreateIndexesCommand, DropCollectionArgument, DropCollectionCommand, DropDatabaseCommand,
    DropIndexesArgument, DropIndexesCommand, IndexSelector, RenameCollectionArgument,
    RenameCollectionCommand,
};
pub use write::{
    DeleteArgument, DeleteCommand, DeleteStatement, InsertArgument, InsertCommand,
    UpdateArgument, UpdateCommand, UpdateResult, UpdateStatement, Upserted, WriteError,
};

use crate::error::{CommandError, CommandResult};
use crate::transaction::WriteTransaction;

/// The envelope every command execution carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Database the command runs against.
    pub database: String,
    /// Whether the request originates inside the server (replication,
    /// maintenance) rather than from a client connection.
    pub from_internal: bool,
}

impl Request {
    /// Creates a request issued by the system itself.
    pub fn internal(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            from_internal: true,
        }
    }

    /// Creates a request issued by a client.
    pub fn user(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            from_internal: false,
        }
    }
}

/// A typed command.
pub trait Command {
    /// Argument type.
    type Arg;
    /// Reply type of an ok status.
    type Reply;

    /// Canonical command name.
    fn name(&self) -> &'static str;

    /// Runs the command. Callers go through [`WriteTransaction::execute`].
    fn run(
        &self,
        request: &Request,
        arg: Self::Arg,
        txn: &mut WriteTransaction<'_>,
    ) -> CommandResult<Self::Reply>;
}

pub(crate) fn validate_collection_name(name: &str) -> CommandResult<()> {
    if name.is_empty() || name.contains('\0') || name.starts_with('.') || name.ends_with('.') {
        return Err(CommandError::bad_value(format!(
            "invalid collection name: '{name}'"
        )));
    }
    Ok(())
}
