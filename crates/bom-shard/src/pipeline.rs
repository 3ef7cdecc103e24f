// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read → compute → write, end to end.
use std::time::{Duration, Instant};

use bom_core::{compute_parts_tree, Computation, PartId};
use tracing::{info, info_span, warn};

use crate::error::PipelineError;
use crate::reader::read_snapshot;
use crate::store::ShardSet;
use crate::writer::{write_results, WriteSummary};

/// Knobs for [`refresh_parts_tree`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Compute but do not write back.
    pub dry_run: bool,
}

/// Wall time spent in each phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Shard read.
    pub read: Duration,
    /// Explosion, aggregation and hashing.
    pub compute: Duration,
    /// Write-back; zero on a dry run.
    pub write: Duration,
}

/// Outcome of one refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refresh {
    /// Root the refresh ran for.
    pub root: PartId,
    /// Computed results and counters.
    pub computation: Computation,
    /// What was written; `None` on a dry run.
    pub writes: Option<WriteSummary>,
    /// Per-phase timings.
    pub timings: PhaseTimings,
}

/// Recomputes the footprint and parts-tree hash of everything under `root`
/// and writes footprints back to their owning shards.
///
/// A read or compute failure aborts before anything is written.
pub fn refresh_parts_tree(
    root: &PartId,
    shards: &ShardSet,
    options: &RefreshOptions,
) -> Result<Refresh, PipelineError> {
    let span = info_span!("refresh_parts_tree", %root, dry_run = options.dry_run);
    let _guard = span.enter();
    let mut timings = PhaseTimings::default();

    let started = Instant::now();
    let snapshot = read_snapshot(shards)?;
    timings.read = started.elapsed();
    info!(edges = snapshot.edges.len(), elapsed = ?timings.read, "shards read");

    let started = Instant::now();
    let computation = compute_parts_tree(root, &snapshot)?;
    timings.compute = started.elapsed();
    let stats = &computation.stats;
    info!(
        nodes = stats.nodes,
        induced_edges = stats.induced_edges,
        results = computation.results.len(),
        elapsed = ?timings.compute,
        "parts tree computed"
    );
    if stats.nodes == 0 {
        warn!("root is not a child of any parts-tree row; nothing to do");
    }
    if stats.missing_co2 > 0 {
        warn!(parts = stats.missing_co2, "parts without CO2 treated as zero");
    }
    if stats.missing_assembler > 0 {
        warn!(parts = stats.missing_assembler, "parts without assembler not written");
    }

    let writes = if options.dry_run {
        None
    } else {
        let started = Instant::now();
        let summary = write_results(shards, &computation)?;
        timings.write = started.elapsed();
        info!(rows = summary.rows(), elapsed = ?timings.write, "footprints written");
        Some(summary)
    };

    Ok(Refresh {
        root: root.clone(),
        computation,
        writes,
        timings,
    })
}
