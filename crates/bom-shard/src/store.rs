// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shard store port.
//!
//! A [`ShardEndpoint`] knows how to reach one shard; every worker calls
//! [`ShardEndpoint::connect`] for its own [`ShardConnection`], so connections
//! are never shared across threads.
use std::fmt;
use std::sync::Arc;

use bom_core::{Cfp, Co2, Edge, PartId, ShardId};

use crate::error::ShardError;

/// Raw contents of one shard's three tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardTables {
    /// `{S}_parts_tree` rows.
    pub edges: Vec<Edge>,
    /// `{S}_cfpval.(partid, co2)` rows.
    pub co2: Vec<(PartId, Co2)>,
    /// `{S}_assembler` rows, assembler still unparsed.
    pub assemblers: Vec<(PartId, String)>,
}

/// An open session against one shard.
pub trait ShardConnection {
    /// Reads every row of the shard's parts-tree, CO2 and assembler tables.
    /// CO2 rows without a value are left out.
    fn load_tables(&mut self) -> Result<ShardTables, ShardError>;

    /// Upserts `(partid, cfp)` into `{S}_cfpval` as one atomic batch. New
    /// rows carry no CO2 value, so they never feed the next read; existing
    /// rows keep theirs. Returns the number of rows written.
    fn upsert_cfp(&mut self, rows: &[(PartId, Cfp)]) -> Result<usize, ShardError>;
}

/// How to reach one shard.
pub trait ShardEndpoint: Send + Sync {
    /// Which shard this endpoint serves (table prefix).
    fn shard(&self) -> ShardId;

    /// Opens a fresh connection for the calling worker.
    fn connect(&self) -> Result<Box<dyn ShardConnection>, ShardError>;
}

/// The three shard endpoints, addressed by [`ShardId`].
#[derive(Clone)]
pub struct ShardSet {
    endpoints: [Arc<dyn ShardEndpoint>; 3],
}

impl ShardSet {
    /// Builds a set from one endpoint per shard, in A, B, C order.
    ///
    /// Fails if an endpoint reports a shard other than its slot.
    pub fn new(
        a: Arc<dyn ShardEndpoint>,
        b: Arc<dyn ShardEndpoint>,
        c: Arc<dyn ShardEndpoint>,
    ) -> Result<Self, ShardError> {
        let endpoints = [a, b, c];
        for (slot, endpoint) in ShardId::ALL.into_iter().zip(&endpoints) {
            if endpoint.shard() != slot {
                return Err(ShardError::Open {
                    shard: slot,
                    detail: format!("endpoint serves shard {}", endpoint.shard()),
                });
            }
        }
        Ok(Self { endpoints })
    }

    /// Builds a set by asking `make` for each shard's endpoint.
    pub fn try_from_fn<F>(mut make: F) -> Result<Self, ShardError>
    where
        F: FnMut(ShardId) -> Result<Arc<dyn ShardEndpoint>, ShardError>,
    {
        Self::new(make(ShardId::A)?, make(ShardId::B)?, make(ShardId::C)?)
    }

    /// Endpoint for `shard`.
    pub fn get(&self, shard: ShardId) -> &dyn ShardEndpoint {
        self.endpoints[shard.index()].as_ref()
    }
}

impl fmt::Debug for ShardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardSet")
            .field("shards", &ShardId::ALL)
            .finish_non_exhaustive()
    }
}
