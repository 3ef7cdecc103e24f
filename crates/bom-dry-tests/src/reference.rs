// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Slow, obviously-correct reference computations.
//!
//! These mirror the definitions directly (path enumeration, plain
//! recursion) and are only fit for small graphs.

use bom_core::{Cfp, Co2Map, Edge, PartHash, PartId};
use std::collections::{BTreeMap, BTreeSet};

/// Induced edges of `root`'s explosion: seed edges (child == root) plus
/// every edge whose parent is an included child, to fixpoint.
pub fn induced_edges<'e>(root: &str, edges: &'e [Edge]) -> Vec<&'e Edge> {
    let mut included = vec![false; edges.len()];
    let mut nodes: BTreeSet<&str> = BTreeSet::new();
    for (i, e) in edges.iter().enumerate() {
        if e.child.as_str() == root {
            included[i] = true;
            nodes.insert(e.child.as_str());
        }
    }
    loop {
        let mut grew = false;
        for (i, e) in edges.iter().enumerate() {
            let from_node = e.parent.as_ref().is_some_and(|p| nodes.contains(p.as_str()));
            if !included[i] && from_node {
                included[i] = true;
                nodes.insert(e.child.as_str());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    edges
        .iter()
        .zip(included)
        .filter_map(|(e, inc)| inc.then_some(e))
        .collect()
}

/// Distinct child ids of the induced edges.
pub fn explosion_nodes(root: &str, edges: &[Edge]) -> BTreeSet<String> {
    induced_edges(root, edges)
        .into_iter()
        .map(|e| e.child.to_string())
        .collect()
}

/// Σ over every path `from ⇝ to` (within the induced edges) of the product
/// of quantities. Assumes the induced edges are acyclic.
pub fn path_quantity(root: &str, edges: &[Edge], from: &str, to: &str) -> u128 {
    let induced = induced_edges(root, edges);
    fn walk(induced: &[&Edge], at: &str, to: &str) -> u128 {
        let mut total = u128::from(at == to);
        for e in induced {
            if e.parent.as_ref().is_some_and(|p| p.as_str() == at) {
                total += u128::from(e.qty) * walk(induced, e.child.as_str(), to);
            }
        }
        total
    }
    walk(&induced, from, to)
}

/// `round4(Σ_n co2(n) × quantity[r][n])` for every explosion node `r`.
pub fn naive_cfp(root: &str, edges: &[Edge], co2: &Co2Map) -> BTreeMap<String, Cfp> {
    let nodes = explosion_nodes(root, edges);
    nodes
        .iter()
        .map(|r| {
            let sum: i128 = nodes
                .iter()
                .map(|n| {
                    let q = i128::try_from(path_quantity(root, edges, r, n)).unwrap_or(i128::MAX);
                    co2.get(n.as_str()).map_or(0, |c| c.raw() * q)
                })
                .sum();
            (r.clone(), Cfp::round_from_co2_units(sum))
        })
        .collect()
}

/// Final hash of `node` by direct recursion over the hash contract.
pub fn naive_hash(
    root: &str,
    edges: &[Edge],
    cfp: &BTreeMap<String, Cfp>,
    node: &str,
) -> PartHash {
    let induced = induced_edges(root, edges);
    let refs = |c: &str| induced.iter().filter(|e| e.child.as_str() == c).count();
    fn go(
        induced: &[&Edge],
        refs: &dyn Fn(&str) -> usize,
        cfp: &BTreeMap<String, Cfp>,
        node: &str,
    ) -> PartHash {
        let text = cfp.get(node).copied().unwrap_or(Cfp::ZERO).to_string();
        let mut acc = PartHash::sha256(text.as_bytes());
        for e in induced {
            let Some(parent) = e.parent.as_ref() else {
                continue;
            };
            if parent.as_str() != node {
                continue;
            }
            let child = go(induced, refs, cfp, e.child.as_str());
            acc ^= if refs(e.child.as_str()) > 1 {
                let mut bytes = child.as_bytes().to_vec();
                bytes.extend_from_slice(PartId::from(node).as_bytes());
                PartHash::sha256(&bytes)
            } else {
                child
            };
        }
        acc
    }
    go(&induced, &refs, cfp, node)
}
