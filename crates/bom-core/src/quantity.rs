// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Quantity propagation and CFP aggregation over an [`ExplosionGraph`].
//!
//! `quantity[r][n]` is the number of units of `n` needed per unit of `r`,
//! summed over every path `r ⇝ n` of the product of edge quantities along
//! the path, with `quantity[r][r] = 1`. Rows are built once, children first:
//!
//! ```text
//! row(r) = {r: 1} + Σ_{edge r→c} qty(edge) × row(c)
//! ```
//!
//! Each child row is built exactly once and reused by every parent, so the
//! table costs one pass over the post-order instead of one traversal per
//! root. Rows are sparse and sorted by [`NodeIx`].
//!
//! `CFP(r) = round4(Σ_n co2(n) × quantity[r][n])`. The sum is exact in
//! [`Co2`] units; rounding happens once at the end.
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::decimal::{Cfp, Co2};
use crate::error::EngineError;
use crate::graph::{ExplosionGraph, NodeIx};
use crate::ident::PartId;

/// Per-part CO2 values, unioned across shards.
pub type Co2Map = FxHashMap<PartId, Co2>;

/// Sparse per-root quantity rows for one explosion.
#[derive(Clone, Debug, Default)]
pub struct QuantityTable {
    rows: Vec<Vec<(NodeIx, u128)>>,
}

impl QuantityTable {
    /// Builds every row in one bottom-up pass over `graph.postorder()`.
    pub fn build(graph: &ExplosionGraph) -> Result<Self, EngineError> {
        let mut rows: Vec<Vec<(NodeIx, u128)>> = vec![Vec::new(); graph.len()];
        for &node in graph.postorder() {
            let overflow = || EngineError::QuantityOverflow {
                part: graph.part(node).clone(),
            };
            let mut acc: BTreeMap<NodeIx, u128> = BTreeMap::new();
            acc.insert(node, 1);
            for edge in graph.children(node) {
                let qty = u128::from(edge.qty);
                for &(n, q) in &rows[edge.child.idx()] {
                    let add = q.checked_mul(qty).ok_or_else(overflow)?;
                    let slot = acc.entry(n).or_insert(0);
                    *slot = slot.checked_add(add).ok_or_else(overflow)?;
                }
            }
            rows[node.idx()] = acc.into_iter().collect();
        }
        Ok(Self { rows })
    }

    /// Units of `part` per unit of `root`; `0` when `part` is not below `root`.
    pub fn quantity(&self, root: NodeIx, part: NodeIx) -> u128 {
        self.row(root)
            .binary_search_by_key(&part, |&(n, _)| n)
            .map_or(0, |i| self.row(root)[i].1)
    }

    /// Every `(part, quantity)` reachable from `root`, `root` included.
    pub fn row(&self, root: NodeIx) -> &[(NodeIx, u128)] {
        self.rows.get(root.idx()).map_or(&[][..], Vec::as_slice)
    }
}

/// Rounded CFP per node, plus how many nodes had no CO2 record.
#[derive(Clone, Debug, Default)]
pub struct CfpTable {
    values: Vec<Cfp>,
    missing_co2: usize,
}

impl CfpTable {
    /// Combines quantity rows with per-part CO2. Parts without a CO2 entry
    /// contribute zero.
    pub fn aggregate(
        graph: &ExplosionGraph,
        quantities: &QuantityTable,
        co2: &Co2Map,
    ) -> Result<Self, EngineError> {
        let unit: Vec<Option<Co2>> = graph
            .nodes()
            .map(|n| co2.get(graph.part(n).as_str()).copied())
            .collect();
        let missing_co2 = unit.iter().filter(|c| c.is_none()).count();

        let mut values = Vec::with_capacity(graph.len());
        for root in graph.nodes() {
            let overflow = || EngineError::CfpOverflow {
                part: graph.part(root).clone(),
            };
            let mut sum: i128 = 0;
            for &(n, q) in quantities.row(root) {
                let Some(c) = unit[n.idx()] else {
                    continue;
                };
                let term = c.checked_mul_qty(q).ok_or_else(overflow)?;
                sum = sum.checked_add(term).ok_or_else(overflow)?;
            }
            values.push(Cfp::round_from_co2_units(sum));
        }
        Ok(Self {
            values,
            missing_co2,
        })
    }

    /// CFP of `node`.
    pub fn get(&self, node: NodeIx) -> Cfp {
        self.values.get(node.idx()).copied().unwrap_or(Cfp::ZERO)
    }

    /// Number of explosion nodes that had no CO2 entry at all.
    pub fn missing_co2(&self) -> usize {
        self.missing_co2
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::Edge;

    fn explode(root: &str, edges: &[Edge]) -> ExplosionGraph {
        ExplosionGraph::explode(&PartId::from(root), edges).unwrap()
    }

    fn co2(pairs: &[(&str, &str)]) -> Co2Map {
        pairs
            .iter()
            .map(|(p, v)| (PartId::from(*p), v.parse().unwrap()))
            .collect()
    }

    fn diamond() -> Vec<Edge> {
        vec![
            Edge::new("R", None, 1),
            Edge::new("A", Some("R"), 1),
            Edge::new("B", Some("R"), 1),
            Edge::new("C", Some("A"), 2),
            Edge::new("C", Some("B"), 3),
        ]
    }

    #[test]
    fn diamond_quantities_sum_over_paths() {
        let g = explode("R", &diamond());
        let q = QuantityTable::build(&g).unwrap();
        let ix = |p: &str| g.lookup(p).unwrap();
        assert_eq!(q.quantity(ix("R"), ix("C")), 5);
        assert_eq!(q.quantity(ix("A"), ix("C")), 2);
        assert_eq!(q.quantity(ix("B"), ix("C")), 3);
        assert_eq!(q.quantity(ix("R"), ix("R")), 1);
        assert_eq!(q.quantity(ix("C"), ix("R")), 0);
        assert_eq!(q.row(ix("C")), &[(ix("C"), 1)]);
    }

    #[test]
    fn quantities_multiply_along_chains() {
        let edges = vec![
            Edge::new("P0", None, 1),
            Edge::new("P1", Some("P0"), 4),
            Edge::new("P2", Some("P1"), 5),
            Edge::new("P3", Some("P2"), 6),
        ];
        let g = explode("P0", &edges);
        let q = QuantityTable::build(&g).unwrap();
        let ix = |p: &str| g.lookup(p).unwrap();
        assert_eq!(q.quantity(ix("P0"), ix("P3")), 120);
        assert_eq!(q.quantity(ix("P1"), ix("P3")), 30);
    }

    #[test]
    fn repeated_rows_double_the_quantity() {
        let edges = vec![
            Edge::new("R", None, 1),
            Edge::new("C", Some("R"), 2),
            Edge::new("C", Some("R"), 2),
        ];
        let g = explode("R", &edges);
        let q = QuantityTable::build(&g).unwrap();
        assert_eq!(q.quantity(g.root().unwrap(), g.lookup("C").unwrap()), 4);
    }

    #[test]
    fn cfp_is_additive_over_children() {
        let edges = vec![
            Edge::new("R", None, 1),
            Edge::new("X", Some("R"), 1),
            Edge::new("Y", Some("R"), 1),
        ];
        let g = explode("R", &edges);
        let q = QuantityTable::build(&g).unwrap();
        let cfp = CfpTable::aggregate(&g, &q, &co2(&[("R", "0"), ("X", "1.0"), ("Y", "2.0")]))
            .unwrap();
        assert_eq!(cfp.get(g.root().unwrap()).to_string(), "3.0000");
        assert_eq!(cfp.get(g.lookup("X").unwrap()).to_string(), "1.0000");
        assert_eq!(cfp.missing_co2(), 0);
    }

    #[test]
    fn cfp_weights_by_diamond_quantity_and_counts_missing_co2() {
        let g = explode("R", &diamond());
        let q = QuantityTable::build(&g).unwrap();
        // R and A have no CO2 row.
        let cfp =
            CfpTable::aggregate(&g, &q, &co2(&[("B", "0.5"), ("C", "0.25")])).unwrap();
        let ix = |p: &str| g.lookup(p).unwrap();
        // R: 0.5×1 (B) + 0.25×5 (C)
        assert_eq!(cfp.get(ix("R")).to_string(), "1.7500");
        assert_eq!(cfp.get(ix("A")).to_string(), "0.5000");
        assert_eq!(cfp.get(ix("B")).to_string(), "1.2500");
        assert_eq!(cfp.missing_co2(), 2);
    }

    #[test]
    fn cfp_rounds_once_after_summing() {
        // 3 × 0.00003 = 0.00009 → 0.0001, whereas rounding each term first
        // would give 0.0000.
        let edges = vec![Edge::new("R", None, 1), Edge::new("X", Some("R"), 3)];
        let g = explode("R", &edges);
        let q = QuantityTable::build(&g).unwrap();
        let cfp = CfpTable::aggregate(&g, &q, &co2(&[("X", "0.00003")])).unwrap();
        assert_eq!(cfp.get(g.root().unwrap()).to_string(), "0.0001");
        assert_eq!(cfp.get(g.lookup("X").unwrap()).to_string(), "0.0000");
    }

    #[test]
    fn overflowing_quantity_is_reported() {
        let mut edges = vec![Edge::new("N0", None, 1)];
        for i in 1..=3 {
            edges.push(Edge::new(
                format!("N{i}").as_str(),
                Some(format!("N{}", i - 1).as_str()),
                u64::MAX,
            ));
        }
        let g = explode("N0", &edges);
        let err = QuantityTable::build(&g).unwrap_err();
        assert!(matches!(err, EngineError::QuantityOverflow { .. }));
    }
}
