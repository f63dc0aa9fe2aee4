//! CLI command implementations.

pub mod inspect;
pub mod replay;

use replidb_document::Document;
use replidb_oplog::{OplogError, Operation};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors reading an oplog dump.
#[derive(Debug, Error)]
pub enum DumpError {
    /// The file could not be read.
    #[error("cannot read dump: {0}")]
    Io(#[from] std::io::Error),

    /// A line is not a JSON object.
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        /// One-based line number.
        line: usize,
        /// Parser error.
        source: serde_json::Error,
    },

    /// A line is not a valid oplog entry.
    #[error("line {line}: {source}")]
    Entry {
        /// One-based line number.
        line: usize,
        /// Entry error.
        source: OplogError,
    },
}

/// Reads a JSON-lines oplog dump. Blank lines are skipped.
pub fn load_dump(path: &Path) -> Result<Vec<Operation>, DumpError> {
    let text = fs::read_to_string(path)?;
    let mut ops = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let entry: Document =
            serde_json::from_str(raw).map_err(|source| DumpError::Json { line, source })?;
        ops.push(Operation::from_entry(&entry).map_err(|source| DumpError::Entry { line, source })?);
    }
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_document::doc;
    use replidb_testkit::{insert_ops, oplog_dump_file, raw_dump_file};
    use std::io::Write;

    #[test]
    fn load_dump_reads_every_line() {
        let ops = insert_ops("shop", "orders", 3);
        let file = oplog_dump_file(&ops);
        assert_eq!(load_dump(file.path()).unwrap(), ops);
    }

    #[test]
    fn load_dump_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"ts": {{"t": 1, "i": 1}}, "op": "n"}}"#).unwrap();
        writeln!(file, "   ").unwrap();
        assert_eq!(load_dump(file.path()).unwrap().len(), 1);
    }

    #[test]
    fn load_dump_reports_line_numbers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"ts": {{"t": 1, "i": 1}}, "op": "n"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        let err = load_dump(file.path()).unwrap_err();
        assert!(matches!(err, DumpError::Json { line: 2, .. }));

        let file = raw_dump_file(&[doc! { "ts" => doc! { "t" => 1, "i" => 1 }, "op" => "x" }]);
        let err = load_dump(file.path()).unwrap_err();
        assert!(matches!(err, DumpError::Entry { line: 1, ref source } if source.is_unknown_operation()));
    }

    #[test]
    fn load_dump_missing_file() {
        let err = load_dump(Path::new("/nonexistent/replidb/dump.jsonl")).unwrap_err();
        assert!(matches!(err, DumpError::Io(_)));
    }
}
