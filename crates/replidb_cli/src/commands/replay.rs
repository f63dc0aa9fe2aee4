//! Replay command implementation.

use super::load_dump;
use replidb_core::{Database, Namespace};
use replidb_document::Document;
use replidb_oplog::Operation;
use replidb_repl::{RemoteOplog, RemoteOplogFetcher, ReplConfig, ReplicationOutcome, ReplicationService};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Collection contents for output.
#[derive(Debug, Serialize)]
pub struct CollectionReport {
    /// Collection namespace.
    pub namespace: String,
    /// Index names.
    pub indexes: Vec<String>,
    /// Documents in natural order.
    pub documents: Vec<Document>,
}

/// Runs the replay command.
pub fn run(
    path: &Path,
    upsert: bool,
    batch_size: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let ops = load_dump(path)?;
    let total = ops.len();
    let reports = replicate(ops, upsert, batch_size)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            print_text_output(&reports, total);
        }
    }

    Ok(())
}

/// Replicates `ops` into a fresh replica and reports every collection.
fn replicate(
    ops: Vec<Operation>,
    upsert: bool,
    batch_size: usize,
) -> Result<Vec<CollectionReport>, Box<dyn std::error::Error>> {
    let log = Arc::new(RemoteOplog::from_operations(ops));
    log.close();

    let db = Arc::new(Database::replica());
    let config = ReplConfig::new("replidb-replay").with_treat_update_as_upsert(upsert);
    let fetcher = RemoteOplogFetcher::new(log).with_batch_size(batch_size);
    let service = ReplicationService::start(Arc::clone(&db), fetcher, config)?;

    match service.join()? {
        ReplicationOutcome::Finished(reason) => info!(reason = %reason, "replay complete"),
        other => return Err(format!("replay did not complete: {other}").into()),
    }

    let mut reports = Vec::new();
    for database in db.database_names() {
        for collection in db.collection_names(&database) {
            let ns = Namespace::new(database.clone(), collection);
            reports.push(CollectionReport {
                namespace: ns.to_string(),
                indexes: db.indexes(&ns).into_iter().map(|i| i.name).collect(),
                documents: db.documents(&ns),
            });
        }
    }
    Ok(reports)
}

fn print_text_output(reports: &[CollectionReport], total: usize) {
    println!("Replayed {} operations into {} collections", total, reports.len());
    println!("================");

    for report in reports {
        println!();
        println!(
            "{} ({} documents; indexes: {})",
            report.namespace,
            report.documents.len(),
            report.indexes.join(", ")
        );
        for doc in &report.documents {
            println!("  {}", doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_document::{doc, Value};
    use replidb_oplog::OpTime;

    #[test]
    fn replicate_reports_collections() {
        let ops = vec![
            Operation::command(OpTime::new(1, 1), "shop", doc! { "create" => "carts" }),
            Operation::insert(OpTime::new(1, 2), "shop", "orders", doc! { "_id" => 1, "n" => 1 }),
            Operation::insert(OpTime::new(1, 3), "shop", "orders", doc! { "_id" => 2, "n" => 2 }),
            Operation::delete(OpTime::new(1, 4), "shop", "orders", doc! { "_id" => 1 }, true),
        ];
        let reports = replicate(ops, false, 2).unwrap();

        let names: Vec<_> = reports.iter().map(|r| r.namespace.as_str()).collect();
        assert_eq!(names, vec!["shop.carts", "shop.orders"]);
        assert_eq!(reports[1].documents, vec![doc! { "_id" => 2, "n" => 2 }]);
        assert_eq!(reports[1].indexes, vec!["_id_".to_string()]);
    }

    #[test]
    fn upsert_flag_turns_update_misses_into_inserts() {
        let update = || {
            vec![Operation::update(
                OpTime::new(1, 1),
                "shop",
                "orders",
                doc! { "_id" => 5 },
                doc! { "$set" => doc! { "n" => 5 } },
                false,
            )]
        };
        assert!(replicate(update(), false, 10).unwrap().is_empty());

        let reports = replicate(update(), true, 10).unwrap();
        assert_eq!(reports[0].documents[0].get("n"), Some(&Value::Integer(5)));
    }

    #[test]
    fn failed_replay_is_an_error() {
        let ops = vec![Operation::command(OpTime::new(1, 1), "shop", doc! { "fooBar" => 1 })];
        let err = replicate(ops, false, 10).unwrap_err();
        assert!(err.to_string().contains("fooBar"));
    }
}
