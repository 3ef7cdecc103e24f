// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shard store and pipeline errors.
use std::fmt;

use bom_core::{EngineError, ShardId};
use thiserror::Error;

/// Failure talking to one shard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardError {
    /// The shard could not be opened (missing file, bad path, locked).
    #[error("[SHARD_OPEN] shard {shard}: {detail}")]
    Open {
        /// Shard that failed.
        shard: ShardId,
        /// Backend message.
        detail: String,
    },
    /// A statement failed against an open shard.
    #[error("[SHARD_QUERY] shard {shard}: {detail}")]
    Query {
        /// Shard that failed.
        shard: ShardId,
        /// Backend message.
        detail: String,
    },
    /// A stored value could not be decoded (negative qty, bad decimal).
    #[error("[SHARD_DECODE] shard {shard}, table {table}: {detail}")]
    Decode {
        /// Shard that failed.
        shard: ShardId,
        /// Table holding the bad row.
        table: String,
        /// What was wrong.
        detail: String,
    },
    /// Failure injected by a test double.
    #[error("[SHARD_INJECTED] shard {shard}: simulated {op} failure")]
    Injected {
        /// Shard that failed.
        shard: ShardId,
        /// Operation that was failed (`connect`, `read`, `write`).
        op: &'static str,
    },
}

impl ShardError {
    /// Whether the shard answered but returned an undecodable row.
    pub fn is_bad_data(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Shard the error came from.
    pub fn shard(&self) -> ShardId {
        match self {
            Self::Open { shard, .. }
            | Self::Query { shard, .. }
            | Self::Decode { shard, .. }
            | Self::Injected { shard, .. } => *shard,
        }
    }
}

/// Per-shard outcome of a failed write-back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteFailure {
    /// Shards whose batch failed, each with its own error.
    pub failed: Vec<ShardError>,
    /// Shards whose batch committed, with rows written.
    pub committed: Vec<(ShardId, usize)>,
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self.failed.iter().map(|e| e.shard().to_string()).collect();
        let committed: Vec<String> = self.committed.iter().map(|(s, _)| s.to_string()).collect();
        write!(
            f,
            "failed [{}], committed [{}]",
            failed.join(", "),
            committed.join(", ")
        )
    }
}

/// Errors from [`refresh_parts_tree`](crate::refresh_parts_tree).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A shard could not be read; nothing was computed or written.
    #[error("[PIPELINE_UNREACHABLE] shard {shard} unreachable: {source}")]
    ShardUnreachable {
        /// First shard (in A, B, C order) that failed.
        shard: ShardId,
        /// Why.
        #[source]
        source: ShardError,
    },
    /// A shard was read but holds a row that cannot be decoded; nothing was
    /// computed or written.
    #[error("[PIPELINE_SHARD_DATA] shard {shard} holds bad data: {source}")]
    ShardData {
        /// First shard (in A, B, C order) that failed.
        shard: ShardId,
        /// The decode error.
        #[source]
        source: ShardError,
    },
    /// The computation failed; nothing was written.
    #[error("[PIPELINE_ENGINE] {0}")]
    Engine(#[from] EngineError),
    /// At least one shard rejected its batch. Other shards may have committed.
    #[error("[PIPELINE_WRITE] write-back failed: {0}")]
    WriteFailure(WriteFailure),
}
