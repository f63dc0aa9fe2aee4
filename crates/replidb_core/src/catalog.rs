//! In-memory catalog of databases, collections and indexes.

use crate::error::{CommandError, CommandResult, ErrorCode};
use crate::types::Namespace;
use replidb_document::{Document, Value, ID_KEY};
use std::collections::BTreeMap;

/// Name of the implicit identity index.
pub const ID_INDEX_NAME: &str = "_id_";

/// Specification of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name, unique per collection.
    pub name: String,
    /// Key pattern: field paths mapped to direction/type.
    pub key: Document,
    /// Whether the key must be unique across the collection.
    pub unique: bool,
}

impl IndexSpec {
    /// Creates an index specification.
    pub fn new(name: impl Into<String>, key: Document, unique: bool) -> Self {
        Self {
            name: name.into(),
            key,
            unique,
        }
    }

    /// The implicit unique index on `_id`.
    pub fn id_index() -> Self {
        Self::new(ID_INDEX_NAME, Document::with(ID_KEY, 1), true)
    }

    /// Extracts this index's key values from a document.
    fn key_of(&self, doc: &Document) -> Vec<Option<Value>> {
        self.key
            .keys()
            .map(|path| doc.get_path(path).cloned())
            .collect()
    }
}

/// A collection: documents in natural (insertion) order plus its indexes.
#[derive(Debug, Clone)]
pub struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexSpec::id_index()],
        }
    }
}

impl Collection {
    /// Returns the documents in natural order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Returns the indexes, `_id_` first.
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub(crate) fn documents_mut(&mut self) -> &mut Vec<Document> {
        &mut self.documents
    }

    /// Checks that `candidate` would not violate a unique index.
    ///
    /// `skip` is the position of the document being replaced, if any.
    pub(crate) fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> CommandResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index.key_of(candidate);
            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(pos, _)| Some(*pos) != skip)
                .any(|(_, existing)| index.key_of(existing) == key);
            if clash {
                return Err(CommandError::new(
                    ErrorCode::DuplicateKey,
                    format!("duplicate key on index '{}': {:?}", index.name, key),
                ));
            }
        }
        Ok(())
    }

    /// Adds an index. Returns false if an identical index already exists.
    pub(crate) fn add_index(&mut self, spec: IndexSpec) -> CommandResult<bool> {
        if let Some(existing) = self.indexes.iter().find(|i| i.name == spec.name) {
            if *existing == spec {
                return Ok(false);
            }
            return Err(CommandError::bad_value(format!(
                "index '{}' already exists with different options",
                spec.name
            )));
        }
        if spec.unique {
            for (pos, doc) in self.documents.iter().enumerate() {
                let key = spec.key_of(doc);
                let duplicated = self.documents[pos + 1..]
                    .iter()
                    .any(|other| spec.key_of(other) == key);
                if duplicated {
                    return Err(CommandError::new(
                        ErrorCode::DuplicateKey,
                        format!("cannot build unique index '{}': duplicate key", spec.name),
                    ));
                }
            }
        }
        self.indexes.push(spec);
        Ok(true)
    }

    /// Removes an index by name. The `_id_` index cannot be dropped.
    pub(crate) fn drop_index(&mut self, name: &str) -> CommandResult<()> {
        if name == ID_INDEX_NAME {
            return Err(CommandError::new(
                ErrorCode::IllegalOperation,
                "cannot drop _id index",
            ));
        }
        let pos = self
            .indexes
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| {
                CommandError::new(ErrorCode::IndexNotFound, format!("index not found: {name}"))
            })?;
        self.indexes.remove(pos);
        Ok(())
    }

    /// Removes every index except `_id_`. Returns how many were dropped.
    pub(crate) fn drop_all_indexes(&mut self) -> usize {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name == ID_INDEX_NAME);
        before - self.indexes.len()
    }

    /// Finds the name of an index by its key pattern.
    pub(crate) fn index_name_by_key(&self, key: &Document) -> Option<String> {
        self.indexes
            .iter()
            .find(|i| i.key == *key)
            .map(|i| i.name.clone())
    }
}

/// All databases and their collections.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    databases: BTreeMap<String, BTreeMap<String, Collection>>,
}

impl StoreState {
    /// Looks up a collection.
    pub fn collection(&self, ns: &Namespace) -> Option<&Collection> {
        self.databases.get(&ns.database)?.get(&ns.collection)
    }

    pub(crate) fn collection_mut(&mut self, ns: &Namespace) -> Option<&mut Collection> {
        self.databases
            .get_mut(&ns.database)?
            .get_mut(&ns.collection)
    }

    /// Returns the collection, creating it implicitly if needed.
    pub(crate) fn collection_or_create(&mut self, ns: &Namespace) -> &mut Collection {
        self.databases
            .entry(ns.database.clone())
            .or_default()
            .entry(ns.collection.clone())
            .or_default()
    }

    /// Creates an empty collection. Returns false if it already exists.
    pub(crate) fn create_collection(&mut self, ns: &Namespace) -> bool {
        let db = self.databases.entry(ns.database.clone()).or_default();
        if db.contains_key(&ns.collection) {
            return false;
        }
        db.insert(ns.collection.clone(), Collection::default());
        true
    }

    /// Removes a collection, returning it.
    pub(crate) fn remove_collection(&mut self, ns: &Namespace) -> Option<Collection> {
        let db = self.databases.get_mut(&ns.database)?;
        let removed = db.remove(&ns.collection);
        if db.is_empty() {
            self.databases.remove(&ns.database);
        }
        removed
    }

    /// Inserts a collection under a (new) namespace.
    pub(crate) fn put_collection(&mut self, ns: &Namespace, collection: Collection) {
        self.databases
            .entry(ns.database.clone())
            .or_default()
            .insert(ns.collection.clone(), collection);
    }

    /// Removes a whole database. Returns the number of collections removed.
    pub(crate) fn remove_database(&mut self, database: &str) -> usize {
        self.databases
            .remove(database)
            .map(|colls| colls.len())
            .unwrap_or(0)
    }

    /// Returns the names of all databases.
    pub fn database_names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    /// Returns the collection names of a database.
    pub fn collection_names(&self, database: &str) -> Vec<String> {
        self.databases
            .get(database)
            .map(|colls| colls.keys().cloned().collect())
            .unwrap_or_default()
    }
}
