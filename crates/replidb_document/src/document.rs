//! Ordered documents.

use crate::error::{DocumentError, DocumentResult};
use crate::value::Value;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The reserved identity key.
pub const ID_KEY: &str = "_id";

/// An ordered document.
///
/// Fields keep their insertion order and keys are unique. Equality is
/// structural and order-sensitive, so `{a: 1, b: 2}` and `{b: 2, a: 1}`
/// are different documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Creates a document holding a single field.
    pub fn with(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut doc = Self::new();
        doc.insert(key, value);
        doc
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Inserts a field, replacing the value in place if the key exists.
    ///
    /// Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Gets a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Gets a mutable top-level field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Gets a top-level text field.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    /// Gets a top-level embedded document.
    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    /// Returns true if the key is present at the top level.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    /// Returns the first field, if any.
    pub fn first(&self) -> Option<(&str, &Value)> {
        self.fields.first().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the key of the first field, if any.
    pub fn first_key(&self) -> Option<&str> {
        self.first().map(|(k, _)| k)
    }

    /// Iterates over the fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over the keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Returns the identity (`_id`) value, if present.
    pub fn id(&self) -> Option<&Value> {
        self.get(ID_KEY)
    }

    /// Gets a value by dotted path (`"a.b.c"`).
    ///
    /// Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets a value by dotted path, creating intermediate documents.
    ///
    /// # Errors
    ///
    /// Fails if the path is malformed or an intermediate value exists and
    /// is not a document.
    pub fn set_path(&mut self, path: &str, value: Value) -> DocumentResult<()> {
        let segments = split_path(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| DocumentError::invalid_path(path))?;

        let mut current = self;
        for segment in parents {
            if !current.contains_key(segment) {
                current.insert(*segment, Document::new());
            }
            current = current
                .get_mut(segment)
                .and_then(Value::as_document_mut)
                .ok_or_else(|| DocumentError::NotADocument {
                    path: path.to_string(),
                    segment: (*segment).to_string(),
                })?;
        }
        current.insert(*last, value);
        Ok(())
    }

    /// Removes a value by dotted path.
    ///
    /// Missing intermediate documents are not an error; nothing is removed.
    pub fn remove_path(&mut self, path: &str) -> DocumentResult<Option<Value>> {
        let segments = split_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(DocumentError::invalid_path(path));
        };

        let mut current = self;
        for segment in parents {
            match current.get_mut(segment).and_then(Value::as_document_mut) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(current.remove(last))
    }
}

fn split_path(path: &str) -> DocumentResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(DocumentError::invalid_path(path));
    }
    Ok(segments)
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{ ")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str(" }")
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

pub(crate) fn visit_document_map<'de, A: MapAccess<'de>>(mut map: A) -> Result<Document, A::Error> {
    let mut doc = Document::new();
    while let Some((key, value)) = map.next_entry::<String, Value>()? {
        doc.insert(key, value);
    }
    Ok(doc)
}

struct DocumentVisitor;

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = Document;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a document")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Document, A::Error> {
        visit_document_map(map)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use replidb_document::{doc, Value};
///
/// let d = doc! { "_id" => 1, "name" => "alice" };
/// assert_eq!(d.get("name"), Some(&Value::from("alice")));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut d = $crate::Document::new();
        $( d.insert($key, $value); )+
        d
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn insert_preserves_order_and_replaces_in_place() {
        let mut d = doc! { "b" => 1, "a" => 2 };
        let previous = d.insert("b", 3);

        assert_eq!(previous, Some(Value::Integer(1)));
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(d.get("b"), Some(&Value::Integer(3)));
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a = doc! { "a" => 1, "b" => 2 };
        let b = doc! { "b" => 2, "a" => 1 };
        assert_ne!(a, b);
    }

    #[test]
    fn first_key_and_id() {
        let d = doc! { "create" => "users", "_id" => 7 };
        assert_eq!(d.first_key(), Some("create"));
        assert_eq!(d.id(), Some(&Value::Integer(7)));
        assert_eq!(Document::new().first_key(), None);
    }

    #[test]
    fn dotted_paths() {
        let mut d = doc! { "a" => doc! { "b" => 1 }, "list" => vec![Value::from("x")] };

        assert_eq!(d.get_path("a.b"), Some(&Value::Integer(1)));
        assert_eq!(d.get_path("list.0"), Some(&Value::from("x")));
        assert_eq!(d.get_path("a.missing"), None);

        d.set_path("a.c.d", Value::Integer(5)).unwrap();
        assert_eq!(d.get_path("a.c.d"), Some(&Value::Integer(5)));

        assert_eq!(d.remove_path("a.b").unwrap(), Some(Value::Integer(1)));
        assert_eq!(d.remove_path("x.y").unwrap(), None);
    }

    #[test]
    fn set_path_through_scalar_fails() {
        let mut d = doc! { "a" => 1 };
        let err = d.set_path("a.b", Value::Null).unwrap_err();
        assert!(matches!(err, DocumentError::NotADocument { .. }));
        assert!(d.set_path("a..b", Value::Null).is_err());
    }

    #[test]
    fn json_roundtrip_keeps_key_order() {
        let d: Document = serde_json::from_str(r#"{"z": 1, "a": {"k": "v"}}"#).unwrap();
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(serde_json::to_string(&d).unwrap(), r#"{"z":1,"a":{"k":"v"}}"#);
    }

    #[test]
    fn display() {
        let d = doc! { "_id" => 1, "name" => "bob" };
        assert_eq!(d.to_string(), "{ _id: 1, name: \"bob\" }");
        assert_eq!(Document::new().to_string(), "{}");
    }
}
