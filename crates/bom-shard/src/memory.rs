// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory shard tier.
//!
//! Holds the three tables behind an `Arc<Mutex<_>>`; clones share state, so
//! a test can keep a handle while the pipeline works through the
//! [`ShardEndpoint`] it was given. Failure toggles and call counters make the
//! reader and writer paths observable without a database.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bom_core::{Cfp, Co2, Edge, PartId, ShardId};

use crate::error::ShardError;
use crate::store::{ShardConnection, ShardEndpoint, ShardTables};

/// One `{S}_cfpval` row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CfpRow {
    /// Last written footprint.
    pub cfp: Cfp,
    /// Per-unit CO2 input; `None` on rows created by write-back.
    pub co2: Option<Co2>,
}

#[derive(Debug, Default)]
struct Inner {
    edges: Vec<Edge>,
    cfpval: BTreeMap<PartId, CfpRow>,
    assemblers: BTreeMap<PartId, String>,
    fail_on_connect: bool,
    fail_on_read: bool,
    fail_on_write: bool,
    connect_count: usize,
    write_batches: usize,
}

/// Shared, cloneable in-memory shard.
#[derive(Clone, Debug)]
pub struct MemoryShard {
    shard: ShardId,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryShard {
    /// Empty tables for `shard`.
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            inner: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a parts-tree row.
    pub fn insert_edge(&self, child: &str, parent: Option<&str>, qty: u64) -> &Self {
        self.lock().edges.push(Edge::new(child, parent, qty));
        self
    }

    /// Sets a part's CO2; a new row starts with a zero footprint.
    pub fn set_co2(&self, part: &str, co2: Co2) -> &Self {
        self.lock()
            .cfpval
            .entry(PartId::from(part))
            .and_modify(|row| row.co2 = Some(co2))
            .or_insert(CfpRow {
                cfp: Cfp::ZERO,
                co2: Some(co2),
            });
        self
    }

    /// Sets a part's raw assembler string.
    pub fn set_assembler(&self, part: &str, assembler: &str) -> &Self {
        self.lock()
            .assemblers
            .insert(PartId::from(part), assembler.to_owned());
        self
    }

    /// Replaces all tables with `tables`.
    pub fn load(&self, tables: &ShardTables) {
        let mut inner = self.lock();
        inner.edges.clone_from(&tables.edges);
        inner.cfpval = tables
            .co2
            .iter()
            .map(|(p, co2)| {
                let row = CfpRow {
                    cfp: Cfp::ZERO,
                    co2: Some(*co2),
                };
                (p.clone(), row)
            })
            .collect();
        inner.assemblers = tables.assemblers.iter().cloned().collect();
    }

    /// Stored `{S}_cfpval` row for `part`.
    pub fn row(&self, part: &str) -> Option<CfpRow> {
        self.lock().cfpval.get(part).copied()
    }

    /// Every `{S}_cfpval` row, sorted by part id.
    pub fn rows(&self) -> Vec<(PartId, CfpRow)> {
        self.lock()
            .cfpval
            .iter()
            .map(|(p, r)| (p.clone(), *r))
            .collect()
    }

    /// Fail every subsequent `connect`.
    pub fn set_fail_on_connect(&self, fail: bool) {
        self.lock().fail_on_connect = fail;
    }

    /// Fail every subsequent `load_tables`.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.lock().fail_on_read = fail;
    }

    /// Fail every subsequent `upsert_cfp`.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.lock().fail_on_write = fail;
    }

    /// Connections opened so far, failed attempts included.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Upsert batches attempted so far, failed ones included.
    pub fn write_batches(&self) -> usize {
        self.lock().write_batches
    }
}

impl ShardEndpoint for MemoryShard {
    fn shard(&self) -> ShardId {
        self.shard
    }

    fn connect(&self) -> Result<Box<dyn ShardConnection>, ShardError> {
        let mut inner = self.lock();
        inner.connect_count += 1;
        if inner.fail_on_connect {
            return Err(ShardError::Injected {
                shard: self.shard,
                op: "connect",
            });
        }
        Ok(Box::new(self.clone()))
    }
}

impl ShardConnection for MemoryShard {
    fn load_tables(&mut self) -> Result<ShardTables, ShardError> {
        let inner = self.lock();
        if inner.fail_on_read {
            return Err(ShardError::Injected {
                shard: self.shard,
                op: "read",
            });
        }
        Ok(ShardTables {
            edges: inner.edges.clone(),
            co2: inner
                .cfpval
                .iter()
                .filter_map(|(p, r)| r.co2.map(|co2| (p.clone(), co2)))
                .collect(),
            assemblers: inner
                .assemblers
                .iter()
                .map(|(p, a)| (p.clone(), a.clone()))
                .collect(),
        })
    }

    fn upsert_cfp(&mut self, rows: &[(PartId, Cfp)]) -> Result<usize, ShardError> {
        let mut inner = self.lock();
        inner.write_batches += 1;
        if inner.fail_on_write {
            return Err(ShardError::Injected {
                shard: self.shard,
                op: "write",
            });
        }
        for (part, cfp) in rows {
            inner
                .cfpval
                .entry(part.clone())
                .and_modify(|row| row.cfp = *cfp)
                .or_insert(CfpRow {
                    cfp: *cfp,
                    co2: None,
                });
        }
        Ok(rows.len())
    }
}
