//! Oplog operations.

use crate::error::{OplogError, OplogResult};
use crate::optime::{OpTime, Timestamp};
use replidb_document::{Document, Value};
use std::fmt;

/// Kind-specific payload of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// A document was inserted.
    Insert {
        /// The full inserted document.
        document: Document,
    },
    /// Documents matching `filter` were modified.
    Update {
        /// Selects the documents to modify.
        filter: Document,
        /// Operator update or replacement document.
        modification: Document,
        /// Insert if nothing matches.
        upsert: bool,
    },
    /// Documents matching `filter` were deleted.
    Delete {
        /// Selects the documents to delete.
        filter: Document,
        /// At most one document was deleted.
        just_one: bool,
    },
    /// A database command ran on the source.
    Command {
        /// The raw command request; its leading key names the command.
        request: Document,
    },
    /// A database was declared.
    Db,
    /// No-op marker.
    Noop,
}

impl OperationKind {
    /// Returns the oplog op code.
    pub fn op_code(&self) -> &'static str {
        match self {
            OperationKind::Insert { .. } => "i",
            OperationKind::Update { .. } => "u",
            OperationKind::Delete { .. } => "d",
            OperationKind::Command { .. } => "c",
            OperationKind::Db => "db",
            OperationKind::Noop => "n",
        }
    }

    /// Returns a readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Insert { .. } => "insert",
            OperationKind::Update { .. } => "update",
            OperationKind::Delete { .. } => "delete",
            OperationKind::Command { .. } => "command",
            OperationKind::Db => "db",
            OperationKind::Noop => "noop",
        }
    }
}

/// One record of the remote change log.
///
/// Operations are immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Target database.
    pub database: String,
    /// Target collection; `$cmd` for commands, empty for db/noop entries.
    pub collection: String,
    /// What happened.
    pub kind: OperationKind,
    /// Position in the remote log.
    pub optime: OpTime,
    /// Entry hash, used to detect history rewrites.
    pub hash: i64,
}

impl Operation {
    /// Creates an operation.
    pub fn new(
        optime: OpTime,
        hash: i64,
        database: impl Into<String>,
        collection: impl Into<String>,
        kind: OperationKind,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            kind,
            optime,
            hash,
        }
    }

    /// Creates an insert operation.
    pub fn insert(
        optime: OpTime,
        database: impl Into<String>,
        collection: impl Into<String>,
        document: Document,
    ) -> Self {
        Self::new(optime, 0, database, collection, OperationKind::Insert { document })
    }

    /// Creates an update operation.
    pub fn update(
        optime: OpTime,
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
        modification: Document,
        upsert: bool,
    ) -> Self {
        Self::new(
            optime,
            0,
            database,
            collection,
            OperationKind::Update {
                filter,
                modification,
                upsert,
            },
        )
    }

    /// Creates a delete operation.
    pub fn delete(
        optime: OpTime,
        database: impl Into<String>,
        collection: impl Into<String>,
        filter: Document,
        just_one: bool,
    ) -> Self {
        Self::new(
            optime,
            0,
            database,
            collection,
            OperationKind::Delete { filter, just_one },
        )
    }

    /// Creates a command operation against `database.$cmd`.
    pub fn command(optime: OpTime, database: impl Into<String>, request: Document) -> Self {
        Self::new(optime, 0, database, "$cmd", OperationKind::Command { request })
    }

    /// Creates a no-op marker.
    pub fn noop(optime: OpTime) -> Self {
        Self::new(optime, 0, "", "", OperationKind::Noop)
    }

    /// Sets the entry hash.
    #[must_use]
    pub fn with_hash(mut self, hash: i64) -> Self {
        self.hash = hash;
        self
    }

    /// Returns the `database.collection` namespace string.
    pub fn namespace(&self) -> String {
        match (self.database.is_empty(), self.collection.is_empty()) {
            (true, _) => String::new(),
            (false, true) => self.database.clone(),
            (false, false) => format!("{}.{}", self.database, self.collection),
        }
    }

    /// Parses an oplog entry document.
    ///
    /// Recognized fields: `ts`, `t`, `h`, `op`, `ns`, `o`, `o2` and `b`.
    ///
    /// # Errors
    ///
    /// Fails on unknown op codes, missing or mistyped fields, and
    /// namespaces that do not fit the operation kind.
    pub fn from_entry(entry: &Document) -> OplogResult<Self> {
        let code = text_field(entry, "op")?;
        let optime = parse_optime(entry)?;
        let hash = optional(entry, "h", "integer", Value::as_integer)?.unwrap_or(0);
        let ns = optional(entry, "ns", "text", Value::as_text)?.unwrap_or("");
        let (database, collection) = ns.split_once('.').unwrap_or((ns, ""));

        let kind = match code {
            "i" => OperationKind::Insert {
                document: document_field(entry, "o")?.clone(),
            },
            "u" => OperationKind::Update {
                filter: document_field(entry, "o2")?.clone(),
                modification: document_field(entry, "o")?.clone(),
                upsert: optional(entry, "b", "bool", Value::as_bool)?.unwrap_or(false),
            },
            "d" => OperationKind::Delete {
                filter: document_field(entry, "o")?.clone(),
                just_one: optional(entry, "b", "bool", Value::as_bool)?.unwrap_or(true),
            },
            "c" => OperationKind::Command {
                request: document_field(entry, "o")?.clone(),
            },
            "db" => OperationKind::Db,
            "n" => OperationKind::Noop,
            other => return Err(OplogError::unknown_operation(other)),
        };

        let valid_ns = match kind {
            OperationKind::Insert { .. }
            | OperationKind::Update { .. }
            | OperationKind::Delete { .. } => !database.is_empty() && !collection.is_empty(),
            OperationKind::Command { .. } => !database.is_empty(),
            OperationKind::Db | OperationKind::Noop => true,
        };
        if !valid_ns {
            return Err(OplogError::InvalidNamespace {
                namespace: ns.to_string(),
                kind: kind.name(),
            });
        }

        Ok(Self::new(optime, hash, database, collection, kind))
    }

    /// Builds the oplog entry document for this operation.
    pub fn to_entry(&self) -> Document {
        let mut ts = Document::new();
        ts.insert("t", i64::from(self.optime.timestamp.secs));
        ts.insert("i", i64::from(self.optime.timestamp.inc));

        let mut entry = Document::with("ts", ts);
        if let Some(term) = self.optime.term {
            entry.insert("t", term);
        }
        entry.insert("h", self.hash);
        entry.insert("op", self.kind.op_code());
        let ns = self.namespace();
        if !ns.is_empty() {
            entry.insert("ns", ns);
        }

        match &self.kind {
            OperationKind::Insert { document } => {
                entry.insert("o", document.clone());
            }
            OperationKind::Update {
                filter,
                modification,
                upsert,
            } => {
                entry.insert("o2", filter.clone());
                entry.insert("o", modification.clone());
                entry.insert("b", *upsert);
            }
            OperationKind::Delete { filter, just_one } => {
                entry.insert("o", filter.clone());
                entry.insert("b", *just_one);
            }
            OperationKind::Command { request } => {
                entry.insert("o", request.clone());
            }
            OperationKind::Db | OperationKind::Noop => {}
        }
        entry
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} (h: {})",
            self.kind.name(),
            self.namespace(),
            self.optime,
            self.hash
        )
    }
}

fn text_field<'a>(entry: &'a Document, field: &'static str) -> OplogResult<&'a str> {
    optional(entry, field, "text", Value::as_text)?.ok_or(OplogError::MissingField { field })
}

fn document_field<'a>(entry: &'a Document, field: &'static str) -> OplogResult<&'a Document> {
    optional(entry, field, "document", Value::as_document)?
        .ok_or(OplogError::MissingField { field })
}

fn optional<'a, T>(
    entry: &'a Document,
    field: &'static str,
    expected: &'static str,
    extract: impl Fn(&'a Value) -> Option<T>,
) -> OplogResult<Option<T>> {
    match entry.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => extract(value).map(Some).ok_or(OplogError::InvalidField {
            field,
            expected,
            found: value.type_name(),
        }),
    }
}

/// Reads `ts` (either `{ t, i }` or a packed integer) and the optional `t`
/// term.
fn parse_optime(entry: &Document) -> OplogResult<OpTime> {
    let timestamp = match entry.get("ts") {
        None | Some(Value::Null) => Timestamp::default(),
        Some(Value::Integer(packed)) => Timestamp::from_packed(*packed),
        Some(Value::Document(ts)) => {
            let part = |key: &'static str| -> OplogResult<u32> {
                let raw = optional(ts, key, "integer", Value::as_integer)?.unwrap_or(0);
                u32::try_from(raw).map_err(|_| OplogError::InvalidField {
                    field: "ts",
                    expected: "32-bit unsigned parts",
                    found: "integer",
                })
            };
            Timestamp::new(part("t")?, part("i")?)
        }
        Some(other) => {
            return Err(OplogError::InvalidField {
                field: "ts",
                expected: "timestamp",
                found: other.type_name(),
            })
        }
    };
    let term = optional(entry, "t", "integer", Value::as_integer)?;
    Ok(OpTime { timestamp, term })
}
