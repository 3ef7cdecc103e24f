// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CSV dataset import.
//!
//! A dataset directory holds, per shard `S`, `assemblerS.csv`,
//! `parts_treeS.csv` and `cfpvalS.csv`. Each file starts with one header
//! row; columns follow the table layout. Fields are comma separated and may
//! be enclosed in `"` (a doubled `""` inside quotes is a literal quote). An
//! empty field, `NULL` or `\N` in `parents_partid` means "no parent". The
//! `cfp` column of `cfpvalS.csv` is ignored; footprints are recomputed.
use std::fs;
use std::path::{Path, PathBuf};

use bom_core::{Co2, Edge, PartId, ShardId};
use thiserror::Error;

use crate::store::ShardTables;

/// Errors reading a dataset directory.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A file could not be read.
    #[error("[DATASET_IO] {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A row did not match the table layout.
    #[error("[DATASET_ROW] {path}:{line}: {detail}")]
    Row {
        /// File path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        detail: String,
    },
}

/// File names for `shard` inside a dataset directory.
pub fn dataset_files(dir: &Path, shard: ShardId) -> [PathBuf; 3] {
    let s = shard.prefix();
    [
        dir.join(format!("assembler{s}.csv")),
        dir.join(format!("parts_tree{s}.csv")),
        dir.join(format!("cfpval{s}.csv")),
    ]
}

/// Reads `shard`'s three CSV files from `dir`.
pub fn read_dataset_dir(dir: &Path, shard: ShardId) -> Result<ShardTables, DatasetError> {
    let [assembler, parts_tree, cfpval] = dataset_files(dir, shard);
    let mut tables = ShardTables::default();

    for (line, fields) in read_rows(&assembler)? {
        let [part, owner] = take::<2>(&assembler, line, fields)?;
        tables.assemblers.push((PartId::from(part), owner));
    }
    for (line, fields) in read_rows(&parts_tree)? {
        let [child, parent, qty] = take::<3>(&parts_tree, line, fields)?;
        let qty: u64 = qty.trim().parse().map_err(|e| DatasetError::Row {
            path: parts_tree.clone(),
            line,
            detail: format!("qty {qty:?}: {e}"),
        })?;
        let parent = match parent.as_str() {
            "NULL" | "\\N" => None,
            p => Some(p),
        };
        tables.edges.push(Edge::new(child, parent, qty));
    }
    for (line, fields) in read_rows(&cfpval)? {
        let [part, _cfp, co2] = take::<3>(&cfpval, line, fields)?;
        let co2: Co2 = co2.parse().map_err(|e: bom_core::DecimalError| DatasetError::Row {
            path: cfpval.clone(),
            line,
            detail: e.to_string(),
        })?;
        tables.co2.push((PartId::from(part), co2));
    }
    Ok(tables)
}

fn take<const N: usize>(
    path: &Path,
    line: usize,
    fields: Vec<String>,
) -> Result<[String; N], DatasetError> {
    let found = fields.len();
    fields.try_into().map_err(|_| DatasetError::Row {
        path: path.to_path_buf(),
        line,
        detail: format!("expected {N} fields, found {found}"),
    })
}

/// Data rows of `path` with their 1-based line numbers; header and blank
/// lines skipped.
fn read_rows(path: &Path) -> Result<Vec<(usize, Vec<String>)>, DatasetError> {
    let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rows = Vec::new();
    for (i, raw) in text.lines().enumerate().skip(1) {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.trim().is_empty() {
            continue;
        }
        let fields = split_fields(raw).ok_or_else(|| DatasetError::Row {
            path: path.to_path_buf(),
            line: i + 1,
            detail: "unterminated quoted field".to_owned(),
        })?;
        rows.push((i + 1, fields));
    }
    Ok(rows)
}

/// Splits one CSV record; `None` on an unterminated quote.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }
    if quoted {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_and_escaped_quotes() {
        assert_eq!(
            split_fields(r#""P1","a,b",3"#).unwrap(),
            vec!["P1", "a,b", "3"]
        );
        assert_eq!(split_fields(r#""say ""hi""""#).unwrap(), vec![r#"say "hi""#]);
        assert_eq!(split_fields("x,,y").unwrap(), vec!["x", "", "y"]);
        assert!(split_fields(r#""open"#).is_none());
    }

    #[test]
    fn reads_all_three_files_for_a_shard() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| fs::write(dir.path().join(name), body).unwrap();
        write("assemblerA.csv", "partid,assembler\r\n\"P0\",\"postgresA\"\r\n");
        write(
            "parts_treeA.csv",
            "partid,parents_partid,qty\r\nP0,,1\r\nP1,P0,2\r\nP2,\\N,1\r\n",
        );
        write("cfpvalA.csv", "partid,cfp,co2\nP1,0,1.5\n\n");
        let tables = read_dataset_dir(dir.path(), ShardId::A).unwrap();
        assert_eq!(
            tables.assemblers,
            vec![(PartId::from("P0"), "postgresA".to_owned())]
        );
        assert_eq!(
            tables.edges,
            vec![
                Edge::new("P0", None, 1),
                Edge::new("P1", Some("P0"), 2),
                Edge::new("P2", None, 1),
            ]
        );
        assert_eq!(tables.co2[0].1.to_string(), "1.50000000");
    }

    #[test]
    fn bad_rows_name_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("assemblerB.csv"), "h\n").unwrap();
        fs::write(dir.path().join("parts_treeB.csv"), "h\nP1,P0,many\n").unwrap();
        fs::write(dir.path().join("cfpvalB.csv"), "h\n").unwrap();
        match read_dataset_dir(dir.path(), ShardId::B).unwrap_err() {
            DatasetError::Row { line, path, .. } => {
                assert_eq!(line, 2);
                assert!(path.ends_with("parts_treeB.csv"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
