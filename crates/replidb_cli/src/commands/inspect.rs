//! Inspect command implementation.

use super::load_dump;
use replidb_oplog::Operation;
use serde::Serialize;
use std::path::Path;

/// Operation summary for output.
#[derive(Debug, Serialize, PartialEq)]
pub struct OperationInfo {
    /// Optime, formatted.
    pub optime: String,
    /// Operation kind.
    pub kind: &'static str,
    /// Target namespace.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Entry hash.
    pub hash: i64,
}

impl From<&Operation> for OperationInfo {
    fn from(op: &Operation) -> Self {
        Self {
            optime: op.optime.to_string(),
            kind: op.kind.name(),
            namespace: op.namespace(),
            hash: op.hash,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ops = load_dump(path)?;
    let infos = summarize(&ops, limit);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        _ => {
            print_text_output(&infos, ops.len());
        }
    }

    Ok(())
}

fn summarize(ops: &[Operation], limit: Option<usize>) -> Vec<OperationInfo> {
    ops.iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(OperationInfo::from)
        .collect()
}

fn print_text_output(infos: &[OperationInfo], total: usize) {
    println!("Oplog Operations ({} of {} shown)", infos.len(), total);
    println!("================");
    println!();

    for info in infos {
        print!("{} {:8}", info.optime, info.kind);
        if !info.namespace.is_empty() {
            print!(" {}", info.namespace);
        }
        println!(" h={}", info.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_document::doc;
    use replidb_oplog::OpTime;

    #[test]
    fn summarize_respects_limit() {
        let ops = vec![
            Operation::insert(OpTime::new(1, 1), "shop", "orders", doc! { "_id" => 1 }).with_hash(9),
            Operation::command(OpTime::new(1, 2), "shop", doc! { "drop" => "orders" }),
            Operation::noop(OpTime::new(1, 3)),
        ];

        let infos = summarize(&ops, Some(2));
        assert_eq!(infos.len(), 2);
        assert_eq!(
            infos[0],
            OperationInfo {
                optime: OpTime::new(1, 1).to_string(),
                kind: ops[0].kind.name(),
                namespace: "shop.orders".into(),
                hash: 9,
            }
        );
        assert_eq!(infos[1].namespace, "shop.$cmd");
        assert_eq!(summarize(&ops, None).len(), 3);
    }

    #[test]
    fn noop_serializes_without_namespace() {
        let info = OperationInfo::from(&Operation::noop(OpTime::new(1, 1)));
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("namespace").is_none());
    }
}
