//! Filter matching and update modifiers.
//!
//! Filters support field equality (on dotted paths, with array
//! membership) and operator documents using `$eq`, `$ne`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$in`, `$nin` and `$exists`. Modifications are either
//! operator updates (`$set`, `$unset`, `$inc`) or full replacements.

use crate::error::{CommandError, CommandResult, ErrorCode};
use replidb_document::{Document, Value, ID_KEY};
use std::cmp::Ordering;

/// Returns true if `doc` matches `filter`.
///
/// # Errors
///
/// Fails with `BadValue` on unknown or malformed operators.
pub fn matches(doc: &Document, filter: &Document) -> CommandResult<bool> {
    for (path, condition) in filter.iter() {
        if path.starts_with('$') {
            return Err(CommandError::bad_value(format!(
                "unknown top level operator: {path}"
            )));
        }
        let value = doc.get_path(path);
        let ok = match operator_document(condition) {
            Some(operators) => matches_operators(value, operators)?,
            None => equals(value, condition),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operator_document(condition: &Value) -> Option<&Document> {
    condition
        .as_document()
        .filter(|d| d.first_key().is_some_and(|k| k.starts_with('$')))
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(v) if v == expected => true,
        Some(Value::Array(items)) => items.contains(expected),
        Some(_) => false,
    }
}

fn compares(value: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let direct = value.compare(operand).is_some_and(accept);
    direct
        || value
            .as_array()
            .is_some_and(|items| items.iter().any(|i| i.compare(operand).is_some_and(accept)))
}

fn matches_operators(value: Option<&Value>, operators: &Document) -> CommandResult<bool> {
    for (op, operand) in operators.iter() {
        let ok = match op {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, op, operand)?,
            "$nin" => !in_list(value, op, operand)?,
            "$exists" => value.is_some() == operand.is_truthy(),
            other => {
                return Err(CommandError::bad_value(format!("unknown operator: {other}")));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(value: Option<&Value>, op: &str, operand: &Value) -> CommandResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| CommandError::bad_value(format!("{op} needs an array")))?;
    Ok(candidates.iter().any(|c| equals(value, c)))
}

/// Returns true if the modification is an operator update.
pub fn is_operator_update(modification: &Document) -> bool {
    modification
        .first_key()
        .is_some_and(|k| k.starts_with('$'))
}

/// Applies `modification` to `doc`, returning the new document.
///
/// # Errors
///
/// Fails on malformed modifications, type mismatches (`$inc` on a
/// non-integer) and attempts to change `_id`.
pub fn apply_modification(doc: &Document, modification: &Document) -> CommandResult<Document> {
    let updated = if is_operator_update(modification) {
        apply_operators(doc, modification)?
    } else {
        replace(doc, modification)?
    };
    if doc.id().is_some() && updated.id() != doc.id() {
        return Err(CommandError::new(
            ErrorCode::ImmutableField,
            "the _id field cannot be changed",
        ));
    }
    Ok(updated)
}

fn apply_operators(doc: &Document, modification: &Document) -> CommandResult<Document> {
    let mut updated = doc.clone();
    for (op, args) in modification.iter() {
        let args = args.as_document().ok_or_else(|| {
            CommandError::failed_to_parse(format!("modifier {op} expects a document"))
        })?;
        match op {
            "$set" => {
                for (path, value) in args.iter() {
                    updated.set_path(path, value.clone())?;
                }
            }
            "$unset" => {
                for (path, _) in args.iter() {
                    updated.remove_path(path)?;
                }
            }
            "$inc" => {
                for (path, delta) in args.iter() {
                    let delta = delta.as_integer().ok_or_else(|| {
                        CommandError::new(
                            ErrorCode::TypeMismatch,
                            format!("cannot increment with non-integer argument for '{path}'"),
                        )
                    })?;
                    let current = match updated.get_path(path) {
                        None => 0,
                        Some(Value::Integer(n)) => *n,
                        Some(other) => {
                            return Err(CommandError::new(
                                ErrorCode::TypeMismatch,
                                format!(
                                    "cannot apply $inc to '{path}' of type {}",
                                    other.type_name()
                                ),
                            ));
                        }
                    };
                    let sum = current.checked_add(delta).ok_or_else(|| {
                        CommandError::bad_value(format!("$inc overflow on '{path}'"))
                    })?;
                    updated.set_path(path, Value::Integer(sum))?;
                }
            }
            other if other.starts_with('$') => {
                return Err(CommandError::failed_to_parse(format!(
                    "unknown modifier: {other}"
                )));
            }
            other => {
                return Err(CommandError::failed_to_parse(format!(
                    "cannot mix operators and fields in an update: '{other}'"
                )));
            }
        }
    }
    Ok(updated)
}

fn replace(doc: &Document, replacement: &Document) -> CommandResult<Document> {
    let mut updated = Document::new();
    match (doc.id(), replacement.id()) {
        (Some(old), Some(new)) if old != new => {
            return Err(CommandError::new(
                ErrorCode::ImmutableField,
                "the _id field cannot be changed",
            ));
        }
        (Some(id), _) | (None, Some(id)) => {
            updated.insert(ID_KEY, id.clone());
        }
        (None, None) => {}
    }
    for (k, v) in replacement.iter().filter(|(k, _)| *k != ID_KEY) {
        updated.insert(k, v.clone());
    }
    Ok(updated)
}

/// Builds the document an upsert inserts when `filter` matched nothing.
///
/// Equality conditions in the filter seed the document, the modification
/// is applied on top, and an `_id` is generated if still missing.
pub fn upsert_document(filter: &Document, modification: &Document) -> CommandResult<Document> {
    let mut seed = Document::new();
    for (path, condition) in filter.iter() {
        if path.starts_with('$') {
            continue;
        }
        match operator_document(condition) {
            Some(ops) => {
                if let Some(eq) = ops.get("$eq") {
                    seed.set_path(path, eq.clone())?;
                }
            }
            None => seed.set_path(path, condition.clone())?,
        }
    }

    let built = if is_operator_update(modification) {
        apply_operators(&seed, modification)?
    } else {
        replace(&seed, modification)?
    };
    Ok(with_id(built))
}

/// Ensures the document has an `_id`, generating one first if missing.
pub fn with_id(doc: Document) -> Document {
    if doc.id().is_some() {
        return doc;
    }
    let mut identified = Document::with(ID_KEY, uuid::Uuid::new_v4().to_string());
    for (k, v) in doc {
        identified.insert(k, v);
    }
    identified
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_document::doc;

    fn int_list(items: &[i64]) -> Value {
        Value::Array(items.iter().map(|n| Value::Integer(*n)).collect())
    }

    #[test]
    fn equality_and_paths() {
        let d = doc! { "_id" => 1, "a" => doc! { "b" => "x" }, "tags" => int_list(&[1, 2]) };

        assert!(matches(&d, &doc! { "_id" => 1 }).unwrap());
        assert!(matches(&d, &doc! { "a.b" => "x" }).unwrap());
        assert!(matches(&d, &doc! { "tags" => 2 }).unwrap());
        assert!(!matches(&d, &doc! { "_id" => 2 }).unwrap());
        assert!(matches(&d, &doc! { "missing" => () }).unwrap());
        assert!(matches(&d, &Document::new()).unwrap());
    }

    #[test]
    fn comparison_operators() {
        let d = doc! { "n" => 5 };

        assert!(matches(&d, &doc! { "n" => doc! { "$gt" => 4, "$lte" => 5 } }).unwrap());
        assert!(!matches(&d, &doc! { "n" => doc! { "$lt" => 5 } }).unwrap());
        assert!(matches(&d, &doc! { "n" => doc! { "$in" => int_list(&[1, 5]) } }).unwrap());
        assert!(matches(&d, &doc! { "n" => doc! { "$nin" => int_list(&[1]) } }).unwrap());
        assert!(matches(&d, &doc! { "m" => doc! { "$exists" => false } }).unwrap());
        assert!(!matches(&d, &doc! { "n" => doc! { "$gt" => "a" } }).unwrap());
    }

    #[test]
    fn unknown_operator_is_bad_value() {
        let d = doc! { "n" => 5 };
        let err = matches(&d, &doc! { "n" => doc! { "$near" => 1 } }).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadValue);
        assert!(matches(&d, &doc! { "$where" => "x" }).is_err());
    }

    #[test]
    fn operator_updates() {
        let d = doc! { "_id" => 1, "n" => 1, "gone" => true };
        let m = doc! {
            "$set" => doc! { "a.b" => "x" },
            "$inc" => doc! { "n" => 2, "fresh" => 3 },
            "$unset" => doc! { "gone" => "" },
        };

        let updated = apply_modification(&d, &m).unwrap();
        assert_eq!(updated.get_path("a.b"), Some(&Value::from("x")));
        assert_eq!(updated.get("n"), Some(&Value::Integer(3)));
        assert_eq!(updated.get("fresh"), Some(&Value::Integer(3)));
        assert!(!updated.contains_key("gone"));
    }

    #[test]
    fn inc_on_text_is_type_mismatch() {
        let d = doc! { "_id" => 1, "n" => "one" };
        let err = apply_modification(&d, &doc! { "$inc" => doc! { "n" => 1 } }).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn replacement_keeps_id() {
        let d = doc! { "_id" => 1, "a" => 1 };
        let updated = apply_modification(&d, &doc! { "b" => 2 }).unwrap();
        assert_eq!(updated, doc! { "_id" => 1, "b" => 2 });

        let err = apply_modification(&d, &doc! { "_id" => 2 }).unwrap_err();
        assert_eq!(err.code, ErrorCode::ImmutableField);
    }

    #[test]
    fn upsert_seeds_from_filter() {
        let built = upsert_document(
            &doc! { "_id" => 9, "kind" => "a", "n" => doc! { "$gt" => 1 } },
            &doc! { "$set" => doc! { "v" => 1 } },
        )
        .unwrap();
        assert_eq!(built, doc! { "_id" => 9, "kind" => "a", "v" => 1 });
    }

    #[test]
    fn upsert_generates_missing_id() {
        let built = upsert_document(&doc! { "k" => 1 }, &doc! { "k" => 1, "v" => 2 }).unwrap();
        assert_eq!(built.first_key(), Some(ID_KEY));
        assert_eq!(built.get("v"), Some(&Value::Integer(2)));
    }
}
