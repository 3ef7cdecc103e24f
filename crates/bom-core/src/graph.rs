// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! BOM explosion graph: the induced sub-DAG reachable downward from a root.
//!
//! Nodes live in an arena addressed by dense [`NodeIx`] values; adjacency is
//! stored per node as `(child, qty)` pairs. Edge multiplicity is preserved: a
//! `(parent, child)` row that appears twice in the induced set appears twice
//! in the parent's child list and counts twice in the child's reference
//! count.
//!
//! Traversal order is deterministic for a given edge list: nodes are
//! discovered breadth-first, and a node's children keep the order of the
//! edge list. Nothing downstream depends on that order for its result, only
//! for its iteration.
use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::error::EngineError;
use crate::ident::PartId;

/// One `parts_tree` row: one unit of `parent` requires `qty` units of `child`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    /// Component part.
    pub child: PartId,
    /// Assembly the component goes into; `None` marks a chain root.
    pub parent: Option<PartId>,
    /// Units of `child` per unit of `parent`.
    pub qty: u64,
}

impl Edge {
    /// Builds an edge; an empty parent string is treated as "no parent".
    pub fn new(child: impl Into<PartId>, parent: Option<&str>, qty: u64) -> Self {
        Self {
            child: child.into(),
            parent: parent.filter(|p| !p.is_empty()).map(PartId::from),
            qty,
        }
    }
}

/// Dense arena index of a node inside one [`ExplosionGraph`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeIx(pub u32);

impl NodeIx {
    /// Index as `usize` for slice access.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Outbound (parent → child) adjacency entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChildEdge {
    /// Child node.
    pub child: NodeIx,
    /// Units of child per unit of parent.
    pub qty: u64,
}

/// The induced explosion DAG for one root.
#[derive(Clone, Debug, Default)]
pub struct ExplosionGraph {
    root: Option<NodeIx>,
    ids: Vec<PartId>,
    index: FxHashMap<PartId, NodeIx>,
    children: Vec<Vec<ChildEdge>>,
    ref_counts: Vec<u32>,
    induced_edges: usize,
    postorder: Vec<NodeIx>,
}

impl ExplosionGraph {
    /// Performs the BOM explosion of `root` over `edges`.
    ///
    /// Seeds with every edge whose child is `root`, then repeatedly pulls in
    /// every edge whose parent is an already included child until fixpoint.
    /// The result is validated acyclic; the first node re-entered while still
    /// on the DFS path is reported as [`EngineError::CycleDetected`].
    ///
    /// A root that never appears as a child yields an empty graph.
    pub fn explode(root: &PartId, edges: &[Edge]) -> Result<Self, EngineError> {
        let mut by_parent: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        for (i, edge) in edges.iter().enumerate() {
            if let Some(parent) = &edge.parent {
                by_parent.entry(parent.as_str()).or_default().push(i);
            }
        }

        let mut graph = Self::default();
        let mut included = vec![false; edges.len()];
        let mut root_ix = None;
        for (i, edge) in edges.iter().enumerate() {
            if &edge.child != root {
                continue;
            }
            let ix = *root_ix.get_or_insert_with(|| graph.intern(root));
            included[i] = true;
            graph.ref_counts[ix.idx()] += 1;
            graph.induced_edges += 1;
        }
        let Some(root_ix) = root_ix else {
            return Ok(graph);
        };
        graph.root = Some(root_ix);

        let mut queue = VecDeque::from([root_ix]);
        while let Some(current) = queue.pop_front() {
            let Some(outbound) = by_parent.get(graph.ids[current.idx()].as_str()) else {
                continue;
            };
            for &i in outbound {
                let edge = &edges[i];
                let (child, fresh) = match graph.index.get(&edge.child) {
                    Some(&ix) => (ix, false),
                    None => (graph.intern(&edge.child), true),
                };
                graph.children[current.idx()].push(ChildEdge {
                    child,
                    qty: edge.qty,
                });
                // Seed edges were counted when the root was interned; an
                // included parent only adds the adjacency (a loop through
                // the root).
                if !included[i] {
                    included[i] = true;
                    graph.ref_counts[child.idx()] += 1;
                    graph.induced_edges += 1;
                }
                if fresh {
                    queue.push_back(child);
                }
            }
        }

        graph.postorder = graph.validated_postorder(root_ix)?;
        Ok(graph)
    }

    fn intern(&mut self, id: &PartId) -> NodeIx {
        // Arena size is bounded by the edge list, which never approaches u32::MAX.
        #[allow(clippy::cast_possible_truncation)]
        let ix = NodeIx(self.ids.len() as u32);
        self.ids.push(id.clone());
        self.index.insert(id.clone(), ix);
        self.children.push(Vec::new());
        self.ref_counts.push(0);
        ix
    }

    /// Iterative three-colour DFS from `root`; children before parents.
    fn validated_postorder(&self, root: NodeIx) -> Result<Vec<NodeIx>, EngineError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        let mut marks = vec![Mark::White; self.ids.len()];
        let mut order = Vec::with_capacity(self.ids.len());
        // (node, next child cursor)
        let mut stack: Vec<(NodeIx, usize)> = vec![(root, 0)];
        marks[root.idx()] = Mark::Grey;

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            if let Some(edge) = self.children[node.idx()].get(cursor) {
                frame.1 += 1;
                match marks[edge.child.idx()] {
                    Mark::White => {
                        marks[edge.child.idx()] = Mark::Grey;
                        stack.push((edge.child, 0));
                    }
                    Mark::Grey => {
                        return Err(EngineError::CycleDetected {
                            part: self.ids[edge.child.idx()].clone(),
                        });
                    }
                    Mark::Black => {}
                }
            } else {
                marks[node.idx()] = Mark::Black;
                order.push(node);
                stack.pop();
            }
        }
        Ok(order)
    }

    /// Root node, or `None` for an empty explosion.
    pub fn root(&self) -> Option<NodeIx> {
        self.root
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// `true` when the root had no inbound edge at all.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of induced edges, counting repeated rows and seed edges.
    pub fn induced_edge_count(&self) -> usize {
        self.induced_edges
    }

    /// Part id of `ix`.
    pub fn part(&self, ix: NodeIx) -> &PartId {
        &self.ids[ix.idx()]
    }

    /// Arena index of `part`, if it is in the explosion.
    pub fn lookup(&self, part: &str) -> Option<NodeIx> {
        self.index.get(part).copied()
    }

    /// Outbound edges of `ix`, in edge-list order, repeats included.
    pub fn children(&self, ix: NodeIx) -> &[ChildEdge] {
        &self.children[ix.idx()]
    }

    /// How many induced edges name `ix` as their child.
    pub fn ref_count(&self, ix: NodeIx) -> u32 {
        self.ref_counts[ix.idx()]
    }

    /// `true` when more than one induced edge references `ix` as child.
    pub fn is_duplicated(&self, ix: NodeIx) -> bool {
        self.ref_count(ix) > 1
    }

    /// Every node, children before parents.
    pub fn postorder(&self) -> &[NodeIx] {
        &self.postorder
    }

    /// All nodes in arena (discovery) order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIx> + '_ {
        (0..self.ids.len()).map(|i| {
            #[allow(clippy::cast_possible_truncation)]
            let ix = NodeIx(i as u32);
            ix
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn e(child: &str, parent: Option<&str>, qty: u64) -> Edge {
        Edge::new(child, parent, qty)
    }

    #[test]
    fn explosion_follows_parent_links_downward_only() {
        let edges = vec![
            e("P0", None, 1),
            e("P1", Some("P0"), 2),
            e("P2", Some("P1"), 3),
            // Unrelated chain.
            e("X0", None, 1),
            e("X1", Some("X0"), 1),
        ];
        let g = ExplosionGraph::explode(&PartId::from("P1"), &edges).unwrap();
        assert_eq!(g.len(), 2);
        assert!(g.lookup("P0").is_none(), "root's parent is not a node");
        assert!(g.lookup("X1").is_none());
        // seed edge (P1 <- P0) + (P2 <- P1)
        assert_eq!(g.induced_edge_count(), 2);
        let p1 = g.lookup("P1").unwrap();
        let p2 = g.lookup("P2").unwrap();
        assert_eq!(g.children(p1), &[ChildEdge { child: p2, qty: 3 }]);
        assert_eq!(g.postorder(), &[p2, p1]);
    }

    #[test]
    fn unknown_root_yields_empty_graph() {
        let edges = vec![e("P1", Some("P0"), 1)];
        let g = ExplosionGraph::explode(&PartId::from("P0"), &edges).unwrap();
        assert!(g.is_empty());
        assert!(g.root().is_none());
        assert_eq!(g.induced_edge_count(), 0);
    }

    #[test]
    fn diamond_child_is_shared_and_counted_twice() {
        let edges = vec![
            e("R", None, 1),
            e("A", Some("R"), 1),
            e("B", Some("R"), 1),
            e("C", Some("A"), 2),
            e("C", Some("B"), 3),
        ];
        let g = ExplosionGraph::explode(&PartId::from("R"), &edges).unwrap();
        assert_eq!(g.len(), 4);
        let c = g.lookup("C").unwrap();
        assert_eq!(g.ref_count(c), 2);
        assert!(g.is_duplicated(c));
        assert!(!g.is_duplicated(g.lookup("A").unwrap()));
        // Post-order: C before both of its parents, R last.
        let pos = |p: &str| {
            let ix = g.lookup(p).unwrap();
            g.postorder().iter().position(|&n| n == ix).unwrap()
        };
        assert!(pos("C") < pos("A"));
        assert!(pos("C") < pos("B"));
        assert_eq!(pos("R"), 3);
    }

    #[test]
    fn repeated_rows_are_kept() {
        let edges = vec![e("R", None, 1), e("C", Some("R"), 2), e("C", Some("R"), 2)];
        let g = ExplosionGraph::explode(&PartId::from("R"), &edges).unwrap();
        let r = g.root().unwrap();
        assert_eq!(g.children(r).len(), 2);
        assert_eq!(g.ref_count(g.lookup("C").unwrap()), 2);
    }

    #[test]
    fn root_with_several_parents_counts_every_seed() {
        let edges = vec![e("S", Some("U1"), 1), e("S", Some("U2"), 4)];
        let g = ExplosionGraph::explode(&PartId::from("S"), &edges).unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.ref_count(g.root().unwrap()), 2);
    }

    #[test]
    fn two_node_cycle_is_rejected_from_either_root() {
        let edges = vec![e("X", Some("Y"), 1), e("Y", Some("X"), 1)];
        for root in ["X", "Y"] {
            let err = ExplosionGraph::explode(&PartId::from(root), &edges).unwrap_err();
            assert!(matches!(err, EngineError::CycleDetected { .. }), "{err:?}");
        }
    }

    #[test]
    fn deeper_cycle_names_the_reentered_part() {
        let edges = vec![
            e("R", None, 1),
            e("A", Some("R"), 1),
            e("B", Some("A"), 1),
            e("A", Some("B"), 1),
        ];
        let err = ExplosionGraph::explode(&PartId::from("R"), &edges).unwrap_err();
        match err {
            EngineError::CycleDetected { part } => assert_eq!(part.as_str(), "A"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let edges = vec![e("R", None, 1), e("R", Some("R"), 1)];
        let err = ExplosionGraph::explode(&PartId::from("R"), &edges).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
    }

    #[test]
    fn empty_parent_string_is_no_parent() {
        assert_eq!(Edge::new("P", Some(""), 1).parent, None);
        assert_eq!(
            Edge::new("P", Some("Q"), 1).parent.map(|p| p.to_string()),
            Some("Q".to_owned())
        );
    }
}
