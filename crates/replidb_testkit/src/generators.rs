//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents and oplog operations.
//! Generated documents always carry an `_id` where replication needs one.

use proptest::prelude::*;
use replidb_document::{Document, Value, ID_KEY};
use replidb_oplog::{OpTime, Operation};

/// Strategy for generating field names (never `_id`).
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}").expect("Invalid regex")
}

/// Strategy for generating scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating values, nested up to a few levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::vec((field_name_strategy(), inner), 0..4)
                .prop_map(|fields| Value::Document(build_document(fields))),
        ]
    })
}

/// Strategy for generating documents without an `_id`.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::vec((field_name_strategy(), value_strategy()), 0..6)
        .prop_map(build_document)
}

/// Strategy for generating `_id` values.
pub fn id_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        prop::string::string_regex("[a-f0-9]{8}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating documents with `_id` as the first field.
pub fn document_with_id_strategy() -> impl Strategy<Value = Document> {
    (id_strategy(), document_strategy()).prop_map(|(id, body)| {
        let mut doc = Document::with(ID_KEY, id);
        for (key, value) in body.iter() {
            doc.insert(key, value.clone());
        }
        doc
    })
}

/// Strategy for generating insert operations into `database.collection`.
pub fn insert_operation_strategy(
    database: &'static str,
    collection: &'static str,
) -> impl Strategy<Value = Operation> {
    (1..=u32::MAX, any::<i64>(), document_with_id_strategy()).prop_map(
        move |(inc, hash, doc)| {
            Operation::insert(OpTime::new(1, inc), database, collection, doc).with_hash(hash)
        },
    )
}

fn build_document(fields: Vec<(String, Value)>) -> Document {
    let mut doc = Document::new();
    for (key, value) in fields {
        doc.insert(key, value);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_documents_lead_with_id(doc in document_with_id_strategy()) {
            prop_assert_eq!(doc.first_key(), Some(ID_KEY));
        }

        #[test]
        fn generated_inserts_round_trip_entries(op in insert_operation_strategy("app", "c")) {
            prop_assert_eq!(Operation::from_entry(&op.to_entry()).unwrap(), op);
        }
    }
}
