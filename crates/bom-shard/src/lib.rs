// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! bom-shard: the three-shard store around `bom-core`.
//!
//! [`ShardEndpoint`] is the storage port; [`SqliteShard`] and
//! [`MemoryShard`] implement it. [`read_snapshot`] unions the shards,
//! [`write_results`] writes footprints back per owning shard, and
//! [`refresh_parts_tree`] runs both around the computation.
//!
//! Reads and writes each use at most one scoped thread per shard; every
//! worker opens its own connection.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate
)]

/// CSV dataset import.
pub mod dataset;
mod error;
mod memory;
mod pipeline;
mod reader;
mod sqlite;
mod store;
mod writer;

pub use dataset::{read_dataset_dir, DatasetError};
pub use error::{PipelineError, ShardError, WriteFailure};
pub use memory::{CfpRow, MemoryShard};
pub use pipeline::{refresh_parts_tree, PhaseTimings, Refresh, RefreshOptions};
pub use reader::{merge, read_snapshot};
pub use sqlite::{SqliteShard, DEFAULT_BUSY_TIMEOUT};
pub use store::{ShardConnection, ShardEndpoint, ShardSet, ShardTables};
pub use writer::{partition, write_results, WriteSummary};
