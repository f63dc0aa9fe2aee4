//! Unmarshalling of replicated command requests.

use replidb_core::{CommandError, CommandResult, ErrorCode, IndexSpec, Namespace};
use replidb_document::{Document, Value};

pub(crate) fn required<'a>(request: &'a Document, field: &str) -> CommandResult<&'a Value> {
    request.get(field).ok_or_else(|| {
        CommandError::failed_to_parse(format!("missing required field '{field}'"))
    })
}

pub(crate) fn text<'a>(request: &'a Document, field: &str) -> CommandResult<&'a str> {
    let value = required(request, field)?;
    value.as_text().ok_or_else(|| type_mismatch(field, "string", value))
}

pub(crate) fn optional_bool(request: &Document, field: &str) -> CommandResult<bool> {
    match request.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Integer(n)) => Ok(*n != 0),
        Some(other) => Err(type_mismatch(field, "bool", other)),
    }
}

pub(crate) fn namespace(request: &Document, field: &str) -> CommandResult<Namespace> {
    let raw = text(request, field)?;
    Namespace::parse(raw)
        .map_err(|_| CommandError::new(ErrorCode::BadValue, format!("invalid namespace: '{raw}'")))
}

fn type_mismatch(field: &str, expected: &str, found: &Value) -> CommandError {
    CommandError::new(
        ErrorCode::TypeMismatch,
        format!(
            "field '{field}' must be a {expected}, not {}",
            found.type_name()
        ),
    )
}

/// Parses one index description (`key`, optional `name`, optional
/// `unique`). A missing name is derived from the key pattern.
pub(crate) fn index_spec(index: &Document) -> CommandResult<IndexSpec> {
    let key_value = required(index, "key")?;
    let key = key_value
        .as_document()
        .ok_or_else(|| type_mismatch("key", "document", key_value))?;
    if key.is_empty() {
        return Err(CommandError::bad_value("index key pattern cannot be empty"));
    }
    let name = match index.get("name") {
        None | Some(Value::Null) => default_index_name(key),
        Some(_) => text(index, "name")?.to_string(),
    };
    Ok(IndexSpec::new(name, key.clone(), optional_bool(index, "unique")?))
}

/// Parses an entry of the legacy index catalog collection: an index
/// description plus the `ns` it belongs to.
pub(crate) fn index_catalog_entry(entry: &Document) -> CommandResult<(Namespace, IndexSpec)> {
    Ok((namespace(entry, "ns")?, index_spec(entry)?))
}

/// `{ a: 1, b: -1 }` is named `a_1_b_-1`.
fn default_index_name(key: &Document) -> String {
    key.iter()
        .map(|(field, direction)| match direction {
            Value::Text(kind) => format!("{field}_{kind}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}
