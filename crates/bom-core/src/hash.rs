// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Duplicate-aware parts-tree hashing.
//!
//! Hash contract (bit-for-bit):
//!
//! ```text
//! base(n)        = SHA-256(cfp_text(n))
//! contrib(p, c)  = final(c)                                   if refs(c) == 1
//!                = SHA-256(BE32(final(c)) || UTF-8(p))        if refs(c) >  1
//! final(p)       = base(p) XOR contrib(p, c1) XOR contrib(p, c2) XOR ...
//! ```
//!
//! `refs(c)` counts every induced edge naming `c` as child, across the whole
//! explosion. The fold visits every edge occurrence, so two identical
//! contributions under the same parent cancel; that property is part of the
//! contract and is preserved.
use crate::decimal::Cfp;
use crate::error::EngineError;
use crate::graph::{ExplosionGraph, NodeIx};
use crate::ident::{PartHash, PartId};
use crate::quantity::CfpTable;

/// `SHA-256` of the canonical 4-digit CFP text.
pub fn base_hash(cfp: Cfp) -> PartHash {
    PartHash::sha256(cfp.to_canonical_string().as_bytes())
}

/// A duplicated child's hash salted with the referencing parent's id.
pub fn salted_contribution(child_final: PartHash, parent: &PartId) -> PartHash {
    let mut buf = Vec::with_capacity(32 + parent.as_bytes().len());
    buf.extend_from_slice(child_final.as_bytes());
    buf.extend_from_slice(parent.as_bytes());
    PartHash::sha256(&buf)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done(PartHash),
}

/// Memoized per-node hash state for one explosion.
///
/// Owned by a single computation; concurrent roots each build their own.
#[derive(Debug)]
pub struct HashEngine<'g> {
    graph: &'g ExplosionGraph,
    base: Vec<PartHash>,
    state: Vec<Visit>,
}

impl<'g> HashEngine<'g> {
    /// Prepares base hashes for every node from its rounded CFP.
    pub fn new(graph: &'g ExplosionGraph, cfp: &CfpTable) -> Self {
        let base = graph.nodes().map(|n| base_hash(cfp.get(n))).collect();
        Self {
            graph,
            base,
            state: vec![Visit::Unvisited; graph.len()],
        }
    }

    /// Base hash of `node`.
    pub fn base(&self, node: NodeIx) -> PartHash {
        self.base[node.idx()]
    }

    /// What `child` adds to `parent`'s fold, given the child's final hash.
    pub fn contribution(&self, parent: NodeIx, child: NodeIx, child_final: PartHash) -> PartHash {
        if self.graph.is_duplicated(child) {
            salted_contribution(child_final, self.graph.part(parent))
        } else {
            child_final
        }
    }

    /// Final hash of `node`, computing (and memoizing) its sub-DAG first.
    ///
    /// Evaluation is an explicit-stack post-order walk, so deep BOMs do not
    /// consume native stack. Meeting a node that is still in progress means
    /// the explosion has a cycle.
    pub fn final_hash(&mut self, node: NodeIx) -> Result<PartHash, EngineError> {
        if let Visit::Done(h) = self.state[node.idx()] {
            return Ok(h);
        }
        // (node, next child cursor, accumulator)
        let mut stack: Vec<(NodeIx, usize, PartHash)> = vec![(node, 0, self.base(node))];
        self.state[node.idx()] = Visit::InProgress;

        while let Some(&(current, cursor, acc)) = stack.last() {
            let Some(edge) = self.graph.children(current).get(cursor).copied() else {
                self.state[current.idx()] = Visit::Done(acc);
                stack.pop();
                if let Some(parent) = stack.last_mut() {
                    // The parent's cursor already points past this child; fold it now.
                    let child_edge = self.graph.children(parent.0)[parent.1 - 1];
                    parent.2 ^= self.contribution(parent.0, child_edge.child, acc);
                }
                continue;
            };
            match self.state[edge.child.idx()] {
                Visit::Done(child_final) => {
                    let contrib = self.contribution(current, edge.child, child_final);
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                        top.2 ^= contrib;
                    }
                }
                Visit::InProgress => {
                    return Err(EngineError::CycleDetected {
                        part: self.graph.part(edge.child).clone(),
                    });
                }
                Visit::Unvisited => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    self.state[edge.child.idx()] = Visit::InProgress;
                    stack.push((edge.child, 0, self.base(edge.child)));
                }
            }
        }

        match self.state[node.idx()] {
            Visit::Done(h) => Ok(h),
            // Unreachable: the loop only exits once `node` itself is popped.
            Visit::Unvisited | Visit::InProgress => Err(EngineError::CycleDetected {
                part: self.graph.part(node).clone(),
            }),
        }
    }

    /// Final hash of every node, indexed by [`NodeIx`].
    pub fn finalize_all(mut self) -> Result<Vec<PartHash>, EngineError> {
        for &node in self.graph.postorder() {
            self.final_hash(node)?;
        }
        self.state
            .iter()
            .zip(self.graph.nodes())
            .map(|(visit, node)| match visit {
                Visit::Done(h) => Ok(*h),
                Visit::Unvisited | Visit::InProgress => Err(EngineError::CycleDetected {
                    part: self.graph.part(node).clone(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::quantity::{Co2Map, QuantityTable};

    struct Fixture {
        graph: ExplosionGraph,
        cfp: CfpTable,
    }

    fn fixture(root: &str, edges: &[Edge], co2: &[(&str, &str)]) -> Fixture {
        let graph = ExplosionGraph::explode(&PartId::from(root), edges).unwrap();
        let q = QuantityTable::build(&graph).unwrap();
        let co2: Co2Map = co2
            .iter()
            .map(|(p, v)| (PartId::from(*p), v.parse().unwrap()))
            .collect();
        let cfp = CfpTable::aggregate(&graph, &q, &co2).unwrap();
        Fixture { graph, cfp }
    }

    #[test]
    fn base_hash_is_sha256_of_cfp_text() {
        let cfp: Cfp = "12.3".parse().unwrap();
        assert_eq!(base_hash(cfp), PartHash::sha256(b"12.3000"));
    }

    #[test]
    fn leaf_final_hash_is_its_base_hash() {
        let f = fixture("R", &[Edge::new("R", None, 1)], &[("R", "1.5")]);
        let mut engine = HashEngine::new(&f.graph, &f.cfp);
        let r = f.graph.root().unwrap();
        assert_eq!(engine.final_hash(r).unwrap(), PartHash::sha256(b"1.5000"));
    }

    #[test]
    fn single_parent_child_is_folded_unsalted() {
        let edges = [Edge::new("P", None, 1), Edge::new("C", Some("P"), 2)];
        let f = fixture("P", &edges, &[("C", "1")]);
        let mut engine = HashEngine::new(&f.graph, &f.cfp);
        let p = f.graph.lookup("P").unwrap();
        let c = f.graph.lookup("C").unwrap();
        let child = engine.final_hash(c).unwrap();
        assert_eq!(engine.final_hash(p).unwrap(), engine.base(p) ^ child);
        assert_eq!(engine.base(p), PartHash::sha256(b"2.0000"));
    }

    #[test]
    fn duplicated_child_is_salted_per_parent() {
        let edges = [
            Edge::new("R", None, 1),
            Edge::new("A", Some("R"), 1),
            Edge::new("B", Some("R"), 1),
            Edge::new("C", Some("A"), 2),
            Edge::new("C", Some("B"), 3),
        ];
        let f = fixture("R", &edges, &[("C", "1")]);
        let mut engine = HashEngine::new(&f.graph, &f.cfp);
        let ix = |p: &str| f.graph.lookup(p).unwrap();
        let c_final = engine.final_hash(ix("C")).unwrap();

        let under_a = engine.contribution(ix("A"), ix("C"), c_final);
        let under_b = engine.contribution(ix("B"), ix("C"), c_final);
        assert_ne!(under_a, under_b);
        assert_eq!(under_a, salted_contribution(c_final, &PartId::from("A")));

        let mut bytes = c_final.as_bytes().to_vec();
        bytes.extend_from_slice(b"A");
        assert_eq!(under_a, PartHash::sha256(&bytes));

        assert_eq!(
            engine.final_hash(ix("A")).unwrap(),
            engine.base(ix("A")) ^ under_a
        );
        // A and B are referenced once each, so R folds them unsalted.
        let a = engine.final_hash(ix("A")).unwrap();
        let b = engine.final_hash(ix("B")).unwrap();
        assert_eq!(engine.final_hash(ix("R")).unwrap(), engine.base(ix("R")) ^ a ^ b);
    }

    #[test]
    fn repeated_identical_edge_cancels_in_the_fold() {
        // C is referenced twice by R through identical rows: both salted
        // contributions are equal and XOR to zero.
        let edges = [
            Edge::new("R", None, 1),
            Edge::new("C", Some("R"), 1),
            Edge::new("C", Some("R"), 1),
        ];
        let f = fixture("R", &edges, &[("C", "1")]);
        let mut engine = HashEngine::new(&f.graph, &f.cfp);
        let r = f.graph.root().unwrap();
        assert_eq!(engine.final_hash(r).unwrap(), engine.base(r));
    }

    #[test]
    fn finalize_all_matches_on_demand_evaluation() {
        let edges = [
            Edge::new("R", None, 1),
            Edge::new("A", Some("R"), 1),
            Edge::new("B", Some("A"), 2),
            Edge::new("B", Some("R"), 1),
        ];
        let f = fixture("R", &edges, &[("B", "0.5"), ("A", "0.1")]);
        let all = HashEngine::new(&f.graph, &f.cfp).finalize_all().unwrap();
        let mut engine = HashEngine::new(&f.graph, &f.cfp);
        for node in f.graph.nodes() {
            assert_eq!(all[node.idx()], engine.final_hash(node).unwrap());
        }
    }
}
