// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! bom-core: in-memory carbon-footprint engine for bills of materials.
//!
//! Given the union of the shard tables ([`ShardSnapshot`]) and a root part,
//! [`compute_parts_tree`] explodes the root's sub-assembly DAG, propagates
//! quantities bottom-up, rounds each node's carbon footprint to four decimal
//! places, and derives a duplicate-aware 256-bit parts-tree hash per node.
//!
//! # Determinism Invariant
//!
//! Results depend only on the multiset of edges, CO2 values and assembler
//! entries, never on edge order or hash-map iteration order. Emitted results
//! are sorted by [`PartId`].
//!
//! I/O lives in `bom-shard`; nothing here touches storage or threads.
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
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Fixed-point CO2 and CFP decimals.
pub mod decimal;
mod engine;
mod error;
/// Explosion DAG construction.
pub mod graph;
/// Duplicate-aware parts-tree hashing.
pub mod hash;
mod ident;
/// Quantity rows and CFP aggregation.
pub mod quantity;

pub use decimal::{Cfp, Co2, DecimalError};
pub use engine::{
    compute_parts_tree, AssemblerMap, ComputeStats, Computation, PartResult, ShardSnapshot,
};
pub use error::EngineError;
pub use graph::{Edge, ExplosionGraph, NodeIx};
pub use hash::HashEngine;
pub use ident::{PartHash, PartId, ShardId, UnknownShard};
pub use quantity::{CfpTable, Co2Map, QuantityTable};
