//! Commands that may appear in the oplog.
//!
//! The [`ReplCommandLibrary`] resolves a raw request document to a
//! [`ReplCommand`] by its leading key, the command unmarshals its typed
//! [`ReplCommandArg`], and the [`ReplCommandExecutor`] runs it against a
//! write transaction.

mod args;
mod executor;

pub(crate) use args::index_catalog_entry;
pub use executor::ReplCommandExecutor;

use replidb_core::{
    CommandError, CommandResult, CreateCollectionArgument, CreateIndexesArgument,
    DropCollectionArgument, DropIndexesArgument, IndexSelector, RenameCollectionArgument,
};
use replidb_document::{Document, Value};
use std::collections::HashMap;

/// A command the replication engine knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplCommand {
    /// `create`: create a collection.
    Create,
    /// `createIndexes`: build indexes.
    CreateIndexes,
    /// `drop`: drop a collection.
    Drop,
    /// `dropDatabase`: drop the operation's database.
    DropDatabase,
    /// `dropIndexes` / `deleteIndexes`: drop indexes.
    DropIndexes,
    /// `renameCollection`: move a collection.
    RenameCollection,
}

impl ReplCommand {
    /// Every replayable command.
    pub const ALL: [ReplCommand; 6] = [
        ReplCommand::Create,
        ReplCommand::CreateIndexes,
        ReplCommand::Drop,
        ReplCommand::DropDatabase,
        ReplCommand::DropIndexes,
        ReplCommand::RenameCollection,
    ];

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        self.aliases()[0]
    }

    /// Names the command is registered under; the first is canonical.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            ReplCommand::Create => &["create"],
            ReplCommand::CreateIndexes => &["createIndexes"],
            ReplCommand::Drop => &["drop"],
            ReplCommand::DropDatabase => &["dropDatabase"],
            ReplCommand::DropIndexes => &["dropIndexes", "deleteIndexes"],
            ReplCommand::RenameCollection => &["renameCollection"],
        }
    }

    /// Builds the typed argument from a request whose leading key is
    /// `alias`.
    ///
    /// # Errors
    ///
    /// Fails with `FailedToParse`, `TypeMismatch` or `BadValue` when the
    /// request is malformed.
    pub fn unmarshal(&self, request: &Document, alias: &str) -> CommandResult<ReplCommandArg> {
        let arg = match self {
            ReplCommand::Create => {
                ReplCommandArg::Create(CreateCollectionArgument::new(args::text(request, alias)?))
            }
            ReplCommand::CreateIndexes => {
                let collection = args::text(request, alias)?;
                let indexes = args::required(request, "indexes")?
                    .as_array()
                    .ok_or_else(|| CommandError::failed_to_parse("'indexes' must be an array"))?
                    .iter()
                    .map(|index| {
                        index
                            .as_document()
                            .ok_or_else(|| {
                                CommandError::failed_to_parse("each index must be a document")
                            })
                            .and_then(args::index_spec)
                    })
                    .collect::<CommandResult<Vec<_>>>()?;
                ReplCommandArg::CreateIndexes(CreateIndexesArgument::new(collection, indexes))
            }
            ReplCommand::Drop => {
                ReplCommandArg::Drop(DropCollectionArgument::new(args::text(request, alias)?))
            }
            ReplCommand::DropDatabase => ReplCommandArg::DropDatabase,
            ReplCommand::DropIndexes => {
                let collection = args::text(request, alias)?;
                let selector = match args::required(request, "index")? {
                    Value::Text(name) if name == "*" => IndexSelector::All,
                    Value::Text(name) => IndexSelector::Name(name.clone()),
                    Value::Document(key) => IndexSelector::Key(key.clone()),
                    other => {
                        return Err(CommandError::failed_to_parse(format!(
                            "'index' must be a name or a key pattern, not {}",
                            other.type_name()
                        )))
                    }
                };
                ReplCommandArg::DropIndexes(DropIndexesArgument::new(collection, selector))
            }
            ReplCommand::RenameCollection => {
                ReplCommandArg::RenameCollection(RenameCollectionArgument::new(
                    args::namespace(request, alias)?,
                    args::namespace(request, "to")?,
                    args::optional_bool(request, "dropTarget")?,
                ))
            }
        };
        Ok(arg)
    }
}

/// Typed argument of a [`ReplCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommandArg {
    /// Argument of `create`.
    Create(CreateCollectionArgument),
    /// Argument of `createIndexes`.
    CreateIndexes(CreateIndexesArgument),
    /// Argument of `drop`.
    Drop(DropCollectionArgument),
    /// `dropDatabase` takes no argument.
    DropDatabase,
    /// Argument of `dropIndexes`.
    DropIndexes(DropIndexesArgument),
    /// Argument of `renameCollection`.
    RenameCollection(RenameCollectionArgument),
}

impl ReplCommandArg {
    /// The command this argument belongs to.
    pub fn command(&self) -> ReplCommand {
        match self {
            ReplCommandArg::Create(_) => ReplCommand::Create,
            ReplCommandArg::CreateIndexes(_) => ReplCommand::CreateIndexes,
            ReplCommandArg::Drop(_) => ReplCommand::Drop,
            ReplCommandArg::DropDatabase => ReplCommand::DropDatabase,
            ReplCommandArg::DropIndexes(_) => ReplCommand::DropIndexes,
            ReplCommandArg::RenameCollection(_) => ReplCommand::RenameCollection,
        }
    }
}

/// A resolved library lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryEntry {
    /// The command.
    pub command: ReplCommand,
    /// The alias the request used.
    pub alias: &'static str,
}

/// Registry of replayable commands, keyed by alias.
#[derive(Debug, Clone)]
pub struct ReplCommandLibrary {
    by_alias: HashMap<&'static str, ReplCommand>,
}

impl ReplCommandLibrary {
    /// Creates a library with every replayable command registered.
    pub fn new() -> Self {
        let mut library = Self::empty();
        for command in ReplCommand::ALL {
            library.register(command);
        }
        library
    }

    /// Creates a library with nothing registered.
    pub fn empty() -> Self {
        Self {
            by_alias: HashMap::new(),
        }
    }

    /// Registers a command under all of its aliases.
    pub fn register(&mut self, command: ReplCommand) {
        for alias in command.aliases() {
            self.by_alias.insert(*alias, command);
        }
    }

    /// Resolves a request by its leading key.
    pub fn find(&self, request: &Document) -> Option<LibraryEntry> {
        let key = request.first_key()?;
        self.by_alias
            .get_key_value(key)
            .map(|(alias, command)| LibraryEntry {
                command: *command,
                alias: *alias,
            })
    }

    /// Returns every registered alias, sorted.
    pub fn aliases(&self) -> Vec<&'static str> {
        let mut aliases: Vec<_> = self.by_alias.keys().copied().collect();
        aliases.sort_unstable();
        aliases
    }
}

impl Default for ReplCommandLibrary {
    fn default() -> Self {
        Self::new()
    }
}
