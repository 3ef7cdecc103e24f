// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Concurrent union read of the three shards.
use bom_core::{ShardId, ShardSnapshot};
use tracing::{debug, warn};

use crate::error::{PipelineError, ShardError};
use crate::store::{ShardSet, ShardTables};

fn read_one(set: &ShardSet, shard: ShardId) -> Result<ShardTables, ShardError> {
    let mut conn = set.get(shard).connect()?;
    let tables = conn.load_tables()?;
    debug!(
        %shard,
        edges = tables.edges.len(),
        co2 = tables.co2.len(),
        assemblers = tables.assemblers.len(),
        "shard read"
    );
    Ok(tables)
}

/// Reads all three shards on scoped worker threads (one per shard) and
/// unions the results in A, B, C order.
///
/// Every worker runs to completion; the first failure in shard order is
/// reported, as [`PipelineError::ShardData`] for an undecodable row and
/// [`PipelineError::ShardUnreachable`] otherwise. A panicking worker is
/// resumed on the caller.
pub fn read_snapshot(set: &ShardSet) -> Result<ShardSnapshot, PipelineError> {
    let per_shard: Vec<(ShardId, Result<ShardTables, ShardError>)> = std::thread::scope(|s| {
        let handles: Vec<_> = ShardId::ALL
            .into_iter()
            .map(|shard| (shard, s.spawn(move || read_one(set, shard))))
            .collect();
        handles
            .into_iter()
            .map(|(shard, h)| match h.join() {
                Ok(result) => (shard, result),
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    });

    let mut snapshot = ShardSnapshot::default();
    for (shard, result) in per_shard {
        let tables = result.map_err(|source| {
            if source.is_bad_data() {
                PipelineError::ShardData { shard, source }
            } else {
                PipelineError::ShardUnreachable { shard, source }
            }
        })?;
        merge(&mut snapshot, shard, tables);
    }
    Ok(snapshot)
}

/// Appends one shard's tables to `snapshot`. Later shards overwrite earlier
/// CO2 and assembler entries for the same part; CO2 rows written back
/// without a value never reach this point.
pub fn merge(snapshot: &mut ShardSnapshot, shard: ShardId, tables: ShardTables) {
    snapshot.edges.extend(tables.edges);
    snapshot.co2.extend(tables.co2);
    for (part, raw) in tables.assemblers {
        match raw.parse::<ShardId>() {
            Ok(owner) => {
                snapshot.assemblers.insert(part, owner);
            }
            Err(err) => {
                warn!(%shard, %part, %err, "dropping assembler row");
                snapshot.unparsed_assemblers += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryShard;
    use crate::sqlite::SqliteShard;
    use crate::store::ShardEndpoint;

    fn set() -> (ShardSet, [MemoryShard; 3]) {
        let shards = ShardId::ALL.map(MemoryShard::new);
        let [a, b, c] = shards.clone();
        let set = ShardSet::new(Arc::new(a), Arc::new(b), Arc::new(c)).unwrap();
        (set, shards)
    }

    #[test]
    fn union_keeps_shard_order_and_later_shard_wins() {
        let (set, [a, b, c]) = set();
        a.insert_edge("P0", None, 1).set_co2("P0", "1".parse().unwrap());
        b.insert_edge("P1", Some("P0"), 2).set_assembler("P1", "postgresB");
        c.insert_edge("P2", Some("P1"), 3).set_co2("P0", "4".parse().unwrap());
        let snap = read_snapshot(&set).unwrap();
        let children: Vec<&str> = snap.edges.iter().map(|e| e.child.as_str()).collect();
        assert_eq!(children, ["P0", "P1", "P2"]);
        assert_eq!(snap.co2["P0"].to_string(), "4.00000000");
        assert_eq!(snap.assemblers["P1"], ShardId::B);
        assert_eq!(a.connect_count() + b.connect_count() + c.connect_count(), 3);
    }

    #[test]
    fn unparseable_assemblers_are_counted_and_dropped() {
        let (set, [a, _, _]) = set();
        a.set_assembler("P0", "A").set_assembler("P1", "mystery");
        let snap = read_snapshot(&set).unwrap();
        assert_eq!(snap.assemblers.len(), 1);
        assert_eq!(snap.unparsed_assemblers, 1);
    }

    #[test]
    fn first_failing_shard_is_reported() {
        let (set, [_, b, c]) = set();
        b.set_fail_on_read(true);
        c.set_fail_on_connect(true);
        match read_snapshot(&set).unwrap_err() {
            PipelineError::ShardUnreachable { shard, .. } => assert_eq!(shard, ShardId::B),
            other => panic!("unexpected {other:?}"),
        }
        // Every shard was still attempted.
        assert_eq!(c.connect_count(), 1);
        assert_eq!(b.shard(), ShardId::B);
    }

    #[test]
    fn undecodable_row_is_bad_data_not_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let shards = ShardId::ALL.map(|s| SqliteShard::new(s, dir.path().join("bom.db")));
        for shard in &shards {
            shard.create_schema().unwrap();
        }
        rusqlite::Connection::open(dir.path().join("bom.db"))
            .unwrap()
            .execute(
                "INSERT INTO B_parts_tree (partid, parents_partid, qty) VALUES ('C', 'P', -2)",
                [],
            )
            .unwrap();
        let [a, b, c] = shards;
        let set = ShardSet::new(Arc::new(a), Arc::new(b), Arc::new(c)).unwrap();
        match read_snapshot(&set).unwrap_err() {
            PipelineError::ShardData { shard, source } => {
                assert_eq!(shard, ShardId::B);
                assert!(matches!(source, ShardError::Decode { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
