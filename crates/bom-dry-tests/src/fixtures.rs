// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! BOM fixtures: named shapes and a seeded random DAG generator.

use bom_core::{Co2, Edge, PartId, ShardId, ShardSnapshot};
use bom_shard::{MemoryShard, ShardEndpoint, ShardSet, ShardTables};
use std::sync::Arc;

/// Tiny deterministic RNG (xorshift64*) so fixtures don't need `rand`.
#[derive(Clone, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Seeded generator; a zero seed is replaced with 1.
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    /// Next value in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Value in `[0, upper)`; `0` when `upper <= 1`.
    pub fn below(&mut self, upper: u64) -> u64 {
        if upper <= 1 {
            return 0;
        }
        self.next_u64() % upper
    }
}

/// Rows of a BOM, each tagged with the shard that stores it.
#[derive(Clone, Debug, Default)]
pub struct BomFixture {
    tables: [ShardTables; 3],
}

impl BomFixture {
    /// Empty fixture.
    pub fn new() -> Self {
        Self::default()
    }

    fn at(&mut self, shard: ShardId) -> &mut ShardTables {
        &mut self.tables[shard.index()]
    }

    /// Stores a parts-tree row on `shard`.
    pub fn edge(mut self, shard: ShardId, child: &str, parent: Option<&str>, qty: u64) -> Self {
        self.at(shard).edges.push(Edge::new(child, parent, qty));
        self
    }

    /// Stores a CO2 value on `shard`. Panics on malformed decimal text.
    #[allow(clippy::expect_used)]
    pub fn co2(mut self, shard: ShardId, part: &str, value: &str) -> Self {
        let co2: Co2 = value.parse().expect("fixture co2 literal");
        self.at(shard).co2.push((PartId::from(part), co2));
        self
    }

    /// Stores an assembler row on `shard` with the raw owner text.
    pub fn assembler(mut self, shard: ShardId, part: &str, owner: &str) -> Self {
        self.at(shard)
            .assemblers
            .push((PartId::from(part), owner.to_owned()));
        self
    }

    /// Assigns `part` to `shard`: stores the assembler row there, owned by
    /// that shard.
    pub fn owned_by(self, shard: ShardId, part: &str) -> Self {
        self.assembler(shard, part, shard.prefix())
    }

    /// Tables destined for `shard`.
    pub fn tables(&self, shard: ShardId) -> &ShardTables {
        &self.tables[shard.index()]
    }

    /// What the reader would produce for these rows.
    pub fn snapshot(&self) -> ShardSnapshot {
        let mut snap = ShardSnapshot::default();
        for shard in ShardId::ALL {
            bom_shard::merge(&mut snap, shard, self.tables(shard).clone());
        }
        snap
    }

    /// Loads the rows into three fresh [`MemoryShard`]s. Returns the set
    /// plus handles for inspection.
    #[allow(clippy::expect_used)]
    pub fn memory_shards(&self) -> (ShardSet, [MemoryShard; 3]) {
        let shards = ShardId::ALL.map(MemoryShard::new);
        for shard in &shards {
            shard.load(self.tables(shard.shard()));
        }
        let [a, b, c] = shards.clone();
        let set = ShardSet::new(Arc::new(a), Arc::new(b), Arc::new(c))
            .expect("memory shards are created in slot order");
        (set, shards)
    }

    /// `R→{A,B}`, `A→C×2`, `B→C×3`, with every part owned by shard A.
    pub fn diamond() -> Self {
        Self::new()
            .edge(ShardId::A, "R", None, 1)
            .edge(ShardId::A, "A", Some("R"), 1)
            .edge(ShardId::B, "B", Some("R"), 1)
            .edge(ShardId::B, "C", Some("A"), 2)
            .edge(ShardId::C, "C", Some("B"), 3)
            .co2(ShardId::C, "C", "1")
            .owned_by(ShardId::A, "R")
            .owned_by(ShardId::A, "A")
            .owned_by(ShardId::A, "B")
            .owned_by(ShardId::A, "C")
    }
}

/// Random DAG rooted at `"N0"`: node `i` only ever points to nodes with a
/// larger index, so the result is acyclic by construction. Every node is
/// reachable from `N0`. Quantities fall in `1..=max_qty`.
pub fn random_dag(seed: u64, nodes: usize, extra_edges: usize, max_qty: u64) -> Vec<Edge> {
    let mut rng = XorShift64::new(seed);
    let name = |i: usize| format!("N{i}");
    let mut edges = vec![Edge::new(name(0).as_str(), None, 1)];
    let upper = |n: usize| u64::try_from(n).unwrap_or(u64::MAX);
    for child in 1..nodes {
        let parent = usize::try_from(rng.below(upper(child))).unwrap_or(0);
        let qty = 1 + rng.below(max_qty);
        edges.push(Edge::new(name(child).as_str(), Some(name(parent).as_str()), qty));
    }
    for _ in 0..extra_edges {
        if nodes < 2 {
            break;
        }
        let child = 1 + usize::try_from(rng.below(upper(nodes - 1))).unwrap_or(0);
        let parent = usize::try_from(rng.below(upper(child))).unwrap_or(0);
        let qty = 1 + rng.below(max_qty);
        edges.push(Edge::new(name(child).as_str(), Some(name(parent).as_str()), qty));
    }
    edges
}

/// Deterministic Fisher–Yates shuffle.
pub fn shuffle<T>(rng: &mut XorShift64, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = usize::try_from(rng.below(u64::try_from(i + 1).unwrap_or(u64::MAX))).unwrap_or(0);
        items.swap(i, j);
    }
}
