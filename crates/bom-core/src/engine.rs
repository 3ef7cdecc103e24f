// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One-shot parts-tree computation over an in-memory shard snapshot.
use rustc_hash::FxHashMap;

use crate::decimal::{Cfp, Co2};
use crate::error::EngineError;
use crate::graph::{Edge, ExplosionGraph};
use crate::hash::HashEngine;
use crate::ident::{PartHash, PartId, ShardId};
use crate::quantity::{CfpTable, Co2Map, QuantityTable};

/// Which shard owns (and receives the write for) each part.
pub type AssemblerMap = FxHashMap<PartId, ShardId>;

/// Union of the three shards' tables, as loaded by the reader.
#[derive(Clone, Debug, Default)]
pub struct ShardSnapshot {
    /// Every parts-tree row, in A, B, C order.
    pub edges: Vec<Edge>,
    /// Per-unit CO2 per part.
    pub co2: Co2Map,
    /// Owning shard per part.
    pub assemblers: AssemblerMap,
    /// Assembler rows dropped because their shard name was not recognised.
    pub unparsed_assemblers: usize,
}

impl ShardSnapshot {
    /// Adds a parts-tree row.
    pub fn push_edge(&mut self, child: &str, parent: Option<&str>, qty: u64) -> &mut Self {
        self.edges.push(Edge::new(child, parent, qty));
        self
    }

    /// Records a CO2 value; later inserts replace earlier ones.
    pub fn set_co2(&mut self, part: &str, co2: Co2) -> &mut Self {
        self.co2.insert(PartId::from(part), co2);
        self
    }

    /// Records the owning shard of `part`.
    pub fn set_assembler(&mut self, part: &str, shard: ShardId) -> &mut Self {
        self.assemblers.insert(PartId::from(part), shard);
        self
    }
}

/// Computed footprint and hash for one emitted part.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PartResult {
    /// Part the values belong to.
    pub partid: PartId,
    /// Rounded carbon footprint per unit.
    pub cfp: Cfp,
    /// Duplicate-aware parts-tree hash.
    pub hash: PartHash,
    /// Shard the result is written back to.
    pub assembler: ShardId,
}

/// Counters describing one computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComputeStats {
    /// Nodes in the explosion.
    pub nodes: usize,
    /// Induced edges, repeated rows included.
    pub induced_edges: usize,
    /// Nodes with no CO2 entry (treated as zero).
    pub missing_co2: usize,
    /// Nodes with no assembler entry (computed, not emitted).
    pub missing_assembler: usize,
    /// Assembler rows the reader could not map to a shard.
    pub unparsed_assemblers: usize,
}

/// Output of [`compute_parts_tree`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Computation {
    /// Emitted parts, sorted by [`PartId`].
    pub results: Vec<PartResult>,
    /// Counters for logging and reporting.
    pub stats: ComputeStats,
}

impl Computation {
    /// Result for `part`, if it was emitted.
    pub fn get(&self, part: &str) -> Option<&PartResult> {
        self.results
            .binary_search_by(|r| r.partid.as_str().cmp(part))
            .ok()
            .map(|i| &self.results[i])
    }

    /// Emitted results grouped by owning shard, in [`ShardId::ALL`] order.
    /// Shards with nothing to write are left out.
    pub fn by_shard(&self) -> Vec<(ShardId, Vec<&PartResult>)> {
        let mut groups: [Vec<&PartResult>; 3] = Default::default();
        for result in &self.results {
            groups[result.assembler.index()].push(result);
        }
        ShardId::ALL
            .into_iter()
            .zip(groups)
            .filter(|(_, g)| !g.is_empty())
            .collect()
    }
}

/// Explodes `root`, aggregates quantities and CFP, and hashes every node.
///
/// Every node of the explosion is computed; only nodes with an assembler
/// entry are emitted. A root that never appears as a child produces an empty
/// computation.
///
/// # Errors
/// [`EngineError::CycleDetected`] when the explosion is not a DAG, or one of
/// the overflow variants when a quantity or footprint leaves the
/// representable range. No partial results are returned.
pub fn compute_parts_tree(
    root: &PartId,
    snapshot: &ShardSnapshot,
) -> Result<Computation, EngineError> {
    let graph = ExplosionGraph::explode(root, &snapshot.edges)?;
    let quantities = QuantityTable::build(&graph)?;
    let cfp = CfpTable::aggregate(&graph, &quantities, &snapshot.co2)?;
    let hashes = HashEngine::new(&graph, &cfp).finalize_all()?;

    let mut stats = ComputeStats {
        nodes: graph.len(),
        induced_edges: graph.induced_edge_count(),
        missing_co2: cfp.missing_co2(),
        missing_assembler: 0,
        unparsed_assemblers: snapshot.unparsed_assemblers,
    };
    let mut results = Vec::with_capacity(graph.len());
    for node in graph.nodes() {
        let partid = graph.part(node);
        let Some(&assembler) = snapshot.assemblers.get(partid.as_str()) else {
            stats.missing_assembler += 1;
            continue;
        };
        results.push(PartResult {
            partid: partid.clone(),
            cfp: cfp.get(node),
            hash: hashes[node.idx()],
            assembler,
        });
    }
    results.sort_unstable_by(|a, b| a.partid.cmp(&b.partid));
    Ok(Computation { results, stats })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn co2(s: &str) -> Co2 {
        s.parse().unwrap()
    }

    #[test]
    fn unknown_root_computes_nothing() {
        let mut snap = ShardSnapshot::default();
        snap.push_edge("P1", Some("P0"), 1)
            .set_assembler("P0", ShardId::A);
        let out = compute_parts_tree(&PartId::from("P0"), &snap).unwrap();
        assert!(out.results.is_empty());
        assert_eq!(out.stats, ComputeStats::default());
    }

    #[test]
    fn parts_without_assembler_are_hashed_but_not_emitted() {
        let mut snap = ShardSnapshot::default();
        snap.push_edge("R", None, 1)
            .push_edge("C", Some("R"), 2)
            .set_co2("C", co2("1"))
            .set_assembler("R", ShardId::B);
        let out = compute_parts_tree(&PartId::from("R"), &snap).unwrap();
        assert_eq!(out.results.len(), 1);
        let r = out.get("R").unwrap();
        assert_eq!(r.assembler, ShardId::B);
        assert_eq!(r.cfp.to_string(), "2.0000");
        // C's hash still flows into R.
        let c_final = PartHash::sha256(b"1.0000");
        assert_eq!(r.hash, PartHash::sha256(b"2.0000") ^ c_final);
        assert_eq!(out.stats.missing_assembler, 1);
        assert_eq!(out.stats.missing_co2, 1);
        assert_eq!(out.stats.nodes, 2);
        assert_eq!(out.stats.induced_edges, 2);
    }

    #[test]
    fn results_are_sorted_and_grouped_by_shard() {
        let mut snap = ShardSnapshot::default();
        snap.push_edge("R", None, 1)
            .push_edge("Z", Some("R"), 1)
            .push_edge("M", Some("R"), 1)
            .set_assembler("R", ShardId::C)
            .set_assembler("Z", ShardId::A)
            .set_assembler("M", ShardId::C);
        let out = compute_parts_tree(&PartId::from("R"), &snap).unwrap();
        let ids: Vec<&str> = out.results.iter().map(|r| r.partid.as_str()).collect();
        assert_eq!(ids, ["M", "R", "Z"]);
        let groups = out.by_shard();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, ShardId::A);
        assert_eq!(groups[1].0, ShardId::C);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn cycle_aborts_without_results() {
        let mut snap = ShardSnapshot::default();
        snap.push_edge("X", Some("Y"), 1)
            .push_edge("Y", Some("X"), 1)
            .set_assembler("X", ShardId::A);
        let err = compute_parts_tree(&PartId::from("X"), &snap).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
    }
}
