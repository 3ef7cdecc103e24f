// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Concurrent per-shard write-back of computed footprints.
use bom_core::{Cfp, Computation, PartId, ShardId};
use tracing::{debug, warn};

use crate::error::{PipelineError, ShardError, WriteFailure};
use crate::store::ShardSet;

/// Rows committed per shard by a successful write-back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// `(shard, rows)` for every shard that received a batch, in A, B, C order.
    pub batches: Vec<(ShardId, usize)>,
}

impl WriteSummary {
    /// Total rows written.
    pub fn rows(&self) -> usize {
        self.batches.iter().map(|(_, n)| n).sum()
    }
}

/// Splits results into one `(partid, cfp)` batch per owning shard. Shards
/// with nothing to write get no batch.
pub fn partition(computation: &Computation) -> Vec<(ShardId, Vec<(PartId, Cfp)>)> {
    computation
        .by_shard()
        .into_iter()
        .map(|(shard, results)| {
            let rows = results
                .into_iter()
                .map(|r| (r.partid.clone(), r.cfp))
                .collect();
            (shard, rows)
        })
        .collect()
}

fn write_one(set: &ShardSet, shard: ShardId, rows: &[(PartId, Cfp)]) -> Result<usize, ShardError> {
    let mut conn = set.get(shard).connect()?;
    let written = conn.upsert_cfp(rows)?;
    debug!(%shard, rows = written, "batch committed");
    Ok(written)
}

/// Writes each shard's batch on its own scoped worker (at most three), each
/// with its own connection and transaction.
///
/// Every worker runs to completion. If any batch fails the result is
/// [`PipelineError::WriteFailure`], naming every failed shard with its error
/// and every shard that did commit.
pub fn write_results(
    set: &ShardSet,
    computation: &Computation,
) -> Result<WriteSummary, PipelineError> {
    let batches = partition(computation);
    let outcomes: Vec<(ShardId, Result<usize, ShardError>)> = std::thread::scope(|s| {
        let handles: Vec<_> = batches
            .iter()
            .map(|(shard, rows)| {
                let shard = *shard;
                (shard, s.spawn(move || write_one(set, shard, rows)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(shard, h)| match h.join() {
                Ok(result) => (shard, result),
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    });

    let mut summary = WriteSummary::default();
    let mut failure = WriteFailure::default();
    for (shard, outcome) in outcomes {
        match outcome {
            Ok(rows) => summary.batches.push((shard, rows)),
            Err(err) => {
                warn!(%shard, %err, "batch failed");
                failure.failed.push(err);
            }
        }
    }
    if failure.failed.is_empty() {
        Ok(summary)
    } else {
        failure.committed = summary.batches;
        Err(PipelineError::WriteFailure(failure))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use bom_core::{ComputeStats, PartHash, PartResult};

    use super::*;
    use crate::memory::MemoryShard;

    fn result(part: &str, cfp: &str, shard: ShardId) -> PartResult {
        PartResult {
            partid: PartId::from(part),
            cfp: cfp.parse().unwrap(),
            hash: PartHash::ZERO,
            assembler: shard,
        }
    }

    fn computation(results: Vec<PartResult>) -> Computation {
        let mut results = results;
        results.sort_by(|a, b| a.partid.cmp(&b.partid));
        Computation {
            results,
            stats: ComputeStats::default(),
        }
    }

    fn set() -> (ShardSet, [MemoryShard; 3]) {
        let shards = ShardId::ALL.map(MemoryShard::new);
        let [a, b, c] = shards.clone();
        let set = ShardSet::new(Arc::new(a), Arc::new(b), Arc::new(c)).unwrap();
        (set, shards)
    }

    #[test]
    fn one_batch_per_touched_shard() {
        let (set, [a, b, c]) = set();
        let comp = computation(vec![
            result("P1", "1", ShardId::A),
            result("P2", "2", ShardId::C),
            result("P3", "3", ShardId::A),
        ]);
        let summary = write_results(&set, &comp).unwrap();
        assert_eq!(summary.batches, vec![(ShardId::A, 2), (ShardId::C, 1)]);
        assert_eq!(summary.rows(), 3);
        assert_eq!((a.write_batches(), b.write_batches(), c.write_batches()), (1, 0, 1));
        assert_eq!(b.connect_count(), 0);
        assert_eq!(c.row("P2").unwrap().cfp.to_string(), "2.0000");
    }

    #[test]
    fn empty_computation_touches_nothing() {
        let (set, shards) = set();
        let summary = write_results(&set, &Computation::default()).unwrap();
        assert!(summary.batches.is_empty());
        assert!(shards.iter().all(|s| s.connect_count() == 0));
    }

    #[test]
    fn failures_are_reported_per_shard_alongside_commits() {
        let (set, [a, b, c]) = set();
        b.set_fail_on_write(true);
        c.set_fail_on_connect(true);
        let comp = computation(vec![
            result("P1", "1", ShardId::A),
            result("P2", "2", ShardId::B),
            result("P3", "3", ShardId::C),
        ]);
        match write_results(&set, &comp).unwrap_err() {
            PipelineError::WriteFailure(failure) => {
                let failed: Vec<ShardId> = failure.failed.iter().map(ShardError::shard).collect();
                assert_eq!(failed, [ShardId::B, ShardId::C]);
                assert_eq!(failure.committed, vec![(ShardId::A, 1)]);
            }
            other => panic!("unexpected {other:?}"),
        }
        // A committed independently of the failures.
        assert!(a.row("P1").is_some());
        assert!(b.row("P2").is_none());
    }
}
