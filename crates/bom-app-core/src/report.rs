// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! State-change report emitted by the external rewrite engine.
//!
//! The report is consumed, never produced, here. Only the fields the CFP
//! workflow reads are typed; everything else round-trips through `extra`.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Placeholder the engine leaves in `replaceQuery` for the intermediate
/// database name.
pub const INTERMEDIATE_DB_PLACEHOLDER: &str = "__INTERMEDIATE_DB__";

/// Error reading a report file.
#[derive(Debug, Error)]
pub enum ReportError {
    /// File could not be read.
    #[error("[REPORT_IO] {path}: {source}")]
    Io {
        /// Report path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// File is not a valid report.
    #[error("[REPORT_PARSE] {path}: {source}")]
    Parse {
        /// Report path.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Wall time reported for a state-change run. Engines have written it both
/// as a number of seconds and as preformatted text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionTime {
    /// Seconds.
    Seconds(f64),
    /// Free-form text, kept verbatim.
    Text(String),
}

impl fmt::Display for ExecutionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{s}s"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

/// Parsed state-change report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeReport {
    /// How long the run took.
    pub execution_time: ExecutionTime,
    /// Database the engine replayed into.
    #[serde(rename = "intermediateDBName")]
    pub intermediate_db_name: String,
    /// SQL that swaps replayed tables back in; may contain
    /// [`INTERMEDIATE_DB_PLACEHOLDER`].
    #[serde(default)]
    pub replace_query: Option<String>,
    /// Transaction ids that were rolled back.
    #[serde(default)]
    pub rollback_gids: Vec<u64>,
    /// Number of transactions replayed.
    #[serde(default)]
    pub replay_gid_count: Option<u64>,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateChangeReport {
    /// `replaceQuery` with the placeholder bound to `intermediate_db`, and
    /// optionally every occurrence of one database name renamed to another.
    /// `None` when the report carries no query.
    pub fn replace_query_for(
        &self,
        intermediate_db: &str,
        rename: Option<(&str, &str)>,
    ) -> Option<String> {
        let query = self
            .replace_query
            .as_deref()?
            .replace(INTERMEDIATE_DB_PLACEHOLDER, intermediate_db);
        Some(match rename {
            Some((from, to)) if !from.is_empty() => query.replace(from, to),
            _ => query,
        })
    }
}

/// Reads and parses the report at `path`.
pub fn read_state_change_report(path: &Path) -> Result<StateChangeReport, ReportError> {
    let display = path.display().to_string();
    let bytes = fs::read(path).map_err(|source| ReportError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ReportError::Parse {
        path: display,
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "executionTime": 12.5,
        "intermediateDBName": "ult_intermediate_42",
        "replaceQuery": "RENAME TABLE benchbase.t TO __INTERMEDIATE_DB__.t_old;",
        "rollbackGids": [3, 7],
        "replayGidCount": 120,
        "engineVersion": "x"
    }"#;

    #[test]
    fn known_fields_are_typed_and_the_rest_preserved() {
        let report: StateChangeReport = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(report.execution_time, ExecutionTime::Seconds(12.5));
        assert_eq!(report.intermediate_db_name, "ult_intermediate_42");
        assert_eq!(report.rollback_gids, vec![3, 7]);
        assert_eq!(report.replay_gid_count, Some(120));
        assert_eq!(report.extra.get("engineVersion"), Some(&Value::from("x")));

        let back = serde_json::to_value(&report).unwrap();
        assert_eq!(back["engineVersion"], "x");
        assert_eq!(back["intermediateDBName"], "ult_intermediate_42");
    }

    #[test]
    fn placeholder_and_rename_are_substituted() {
        let report: StateChangeReport = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(
            report.replace_query_for("replay_db", None).unwrap(),
            "RENAME TABLE benchbase.t TO replay_db.t_old;"
        );
        assert_eq!(
            report
                .replace_query_for("replay_db", Some(("benchbase", "scratch")))
                .unwrap(),
            "RENAME TABLE scratch.t TO replay_db.t_old;"
        );
    }

    #[test]
    fn textual_execution_time_is_kept() {
        let report: StateChangeReport = serde_json::from_str(
            r#"{"executionTime": "1m 3s", "intermediateDBName": "db"}"#,
        )
        .unwrap();
        assert_eq!(report.execution_time.to_string(), "1m 3s");
        assert!(report.replace_query_for("x", None).is_none());
    }
}
