// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! SQLite shard tier.
//!
//! One database file per shard (several shards may share a file; every
//! table and index name carries the shard prefix). Decimals are stored as
//! text so values survive exactly. A NULL `co2` marks a row created by
//! write-back for a part whose CO2 lives elsewhere (or nowhere); the reader
//! skips it.
use std::path::{Path, PathBuf};
use std::time::Duration;

use bom_core::{Cfp, Co2, Edge, PartId, ShardId};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

use crate::error::ShardError;
use crate::store::{ShardConnection, ShardEndpoint, ShardTables};

/// Default busy timeout for shard connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A shard stored in a SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteShard {
    shard: ShardId,
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteShard {
    /// Shard `shard` stored at `path`.
    pub fn new(shard: ShardId, path: impl Into<PathBuf>) -> Self {
        Self {
            shard,
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Overrides the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, create: bool) -> Result<Connection, ShardError> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|err| ShardError::Open {
            shard: self.shard,
            detail: format!("{}: {err}", self.path.display()),
        })?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|err| self.query_err(&err))?;
        Ok(conn)
    }

    fn query_err(&self, err: &rusqlite::Error) -> ShardError {
        ShardError::Query {
            shard: self.shard,
            detail: err.to_string(),
        }
    }

    /// Creates the shard's tables and indices, creating the file if needed.
    /// Existing tables are left alone.
    pub fn create_schema(&self) -> Result<(), ShardError> {
        let conn = self.open(true)?;
        let s = self.shard.prefix();
        conn.execute_batch(&format!(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS {s}_cfpval (
                partid TEXT PRIMARY KEY,
                cfp TEXT NOT NULL,
                co2 TEXT
            );
            CREATE INDEX IF NOT EXISTS {s}_index_cfpval ON {s}_cfpval (partid);
            CREATE TABLE IF NOT EXISTS {s}_parts_tree (
                partid TEXT,
                parents_partid TEXT,
                qty INTEGER,
                UNIQUE (partid, parents_partid)
            );
            CREATE INDEX IF NOT EXISTS {s}_index_parts_tree ON {s}_parts_tree (partid);
            CREATE TABLE IF NOT EXISTS {s}_assembler (
                partid TEXT PRIMARY KEY,
                assembler TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {s}_index_assembler ON {s}_assembler (partid);
            COMMIT;"
        ))
        .map_err(|err| self.query_err(&err))?;
        debug!(shard = %self.shard, path = %self.path.display(), "schema ready");
        Ok(())
    }

    /// Deletes every row from the shard's three tables.
    pub fn clear(&self) -> Result<(), ShardError> {
        let conn = self.open(false)?;
        let s = self.shard.prefix();
        conn.execute_batch(&format!(
            "BEGIN;
            DELETE FROM {s}_assembler;
            DELETE FROM {s}_parts_tree;
            DELETE FROM {s}_cfpval;
            COMMIT;"
        ))
        .map_err(|err| self.query_err(&err))
    }

    /// Inserts `tables` in one transaction. CO2 rows start with a zero
    /// footprint; duplicate `(partid, parents_partid)` rows are rejected by
    /// the table's unique constraint.
    pub fn insert_tables(&self, tables: &ShardTables) -> Result<(), ShardError> {
        let mut conn = self.open(false)?;
        let s = self.shard.prefix();
        let err = |e: rusqlite::Error| self.query_err(&e);
        let tx = conn.transaction().map_err(err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {s}_parts_tree (partid, parents_partid, qty) VALUES (?1, ?2, ?3)"
                ))
                .map_err(err)?;
            for edge in &tables.edges {
                let qty = i64::try_from(edge.qty).map_err(|_| ShardError::Decode {
                    shard: self.shard,
                    table: self.shard.table("parts_tree"),
                    detail: format!("qty {} exceeds INTEGER range", edge.qty),
                })?;
                stmt.execute(params![
                    edge.child.as_str(),
                    edge.parent.as_ref().map(PartId::as_str),
                    qty
                ])
                .map_err(err)?;
            }
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {s}_cfpval (partid, cfp, co2) VALUES (?1, ?2, ?3)
                     ON CONFLICT(partid) DO UPDATE SET co2 = excluded.co2"
                ))
                .map_err(err)?;
            for (part, co2) in &tables.co2 {
                stmt.execute(params![
                    part.as_str(),
                    Cfp::ZERO.to_string(),
                    co2.to_string()
                ])
                .map_err(err)?;
            }
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {s}_assembler (partid, assembler) VALUES (?1, ?2)"
                ))
                .map_err(err)?;
            for (part, assembler) in &tables.assemblers {
                stmt.execute(params![part.as_str(), assembler]).map_err(err)?;
            }
        }
        tx.commit().map_err(err)
    }

    /// Stored footprint text for `part`, if the row exists.
    pub fn cfp_of(&self, part: &str) -> Result<Option<Cfp>, ShardError> {
        let conn = self.open(false)?;
        let table = self.shard.table("cfpval");
        let mut stmt = conn
            .prepare(&format!("SELECT cfp FROM {table} WHERE partid = ?1"))
            .map_err(|e| self.query_err(&e))?;
        let mut rows = stmt.query(params![part]).map_err(|e| self.query_err(&e))?;
        let Some(row) = rows.next().map_err(|e| self.query_err(&e))? else {
            return Ok(None);
        };
        let text: String = row.get(0).map_err(|e| self.query_err(&e))?;
        text.parse().map(Some).map_err(|e: bom_core::DecimalError| ShardError::Decode {
            shard: self.shard,
            table,
            detail: e.to_string(),
        })
    }
}

impl ShardEndpoint for SqliteShard {
    fn shard(&self) -> ShardId {
        self.shard
    }

    fn connect(&self) -> Result<Box<dyn ShardConnection>, ShardError> {
        let conn = self.open(false)?;
        Ok(Box::new(SqliteConnection {
            shard: self.shard,
            conn,
        }))
    }
}

struct SqliteConnection {
    shard: ShardId,
    conn: Connection,
}

impl SqliteConnection {
    fn query_err(&self, err: &rusqlite::Error) -> ShardError {
        ShardError::Query {
            shard: self.shard,
            detail: err.to_string(),
        }
    }

    fn decode_err(&self, table: &str, detail: String) -> ShardError {
        ShardError::Decode {
            shard: self.shard,
            table: self.shard.table(table),
            detail,
        }
    }

    /// `None` for a NULL placeholder.
    fn decode_co2(&self, part: &PartId, value: ValueRef<'_>) -> Result<Option<Co2>, ShardError> {
        let bad = |detail: String| self.decode_err("cfpval", format!("co2 of {part}: {detail}"));
        let co2 = match value {
            ValueRef::Null => return Ok(None),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map_err(|e| bad(e.to_string()))?
                .parse()
                .map_err(|e: bom_core::DecimalError| bad(e.to_string()))?,
            ValueRef::Real(f) => Co2::from_f64(f).map_err(|e| bad(e.to_string()))?,
            ValueRef::Integer(i) => i128::from(i)
                .checked_mul(100_000_000)
                .map(Co2::from_raw)
                .ok_or_else(|| bad(format!("{i} out of range")))?,
            ValueRef::Blob(_) => return Err(bad("not a decimal".to_owned())),
        };
        Ok(Some(co2))
    }

    fn read_edges(&self) -> Result<Vec<Edge>, ShardError> {
        let table = self.shard.table("parts_tree");
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT partid, parents_partid, qty FROM {table} ORDER BY rowid"
            ))
            .map_err(|e| self.query_err(&e))?;
        let mut rows = stmt.query([]).map_err(|e| self.query_err(&e))?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().map_err(|e| self.query_err(&e))? {
            let child: String = row.get(0).map_err(|e| self.query_err(&e))?;
            let parent: Option<String> = row.get(1).map_err(|e| self.query_err(&e))?;
            let qty: Option<i64> = row.get(2).map_err(|e| self.query_err(&e))?;
            let qty = qty.and_then(|q| u64::try_from(q).ok()).ok_or_else(|| {
                self.decode_err("parts_tree", format!("bad qty {qty:?} for {child}"))
            })?;
            edges.push(Edge::new(child, parent.as_deref(), qty));
        }
        Ok(edges)
    }

    fn read_co2(&self) -> Result<Vec<(PartId, Co2)>, ShardError> {
        let table = self.shard.table("cfpval");
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT partid, co2 FROM {table} ORDER BY rowid"))
            .map_err(|e| self.query_err(&e))?;
        let mut rows = stmt.query([]).map_err(|e| self.query_err(&e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| self.query_err(&e))? {
            let part = PartId::from(row.get::<_, String>(0).map_err(|e| self.query_err(&e))?);
            let value = row.get_ref(1).map_err(|e| self.query_err(&e))?;
            if let Some(co2) = self.decode_co2(&part, value)? {
                out.push((part, co2));
            }
        }
        Ok(out)
    }

    fn read_assemblers(&self) -> Result<Vec<(PartId, String)>, ShardError> {
        let table = self.shard.table("assembler");
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT partid, assembler FROM {table} ORDER BY rowid"))
            .map_err(|e| self.query_err(&e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((PartId::from(row.get::<_, String>(0)?), row.get::<_, String>(1)?))
            })
            .map_err(|e| self.query_err(&e))?;
        rows.collect::<Result<_, _>>()
            .map_err(|e| self.query_err(&e))
    }
}

impl ShardConnection for SqliteConnection {
    fn load_tables(&mut self) -> Result<ShardTables, ShardError> {
        Ok(ShardTables {
            edges: self.read_edges()?,
            co2: self.read_co2()?,
            assemblers: self.read_assemblers()?,
        })
    }

    fn upsert_cfp(&mut self, rows: &[(PartId, Cfp)]) -> Result<usize, ShardError> {
        let shard = self.shard;
        let table = shard.table("cfpval");
        let err = |e: rusqlite::Error| ShardError::Query {
            shard,
            detail: e.to_string(),
        };
        let tx = self.conn.transaction().map_err(err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {table} (partid, cfp, co2) VALUES (?1, ?2, ?3)
                     ON CONFLICT(partid) DO UPDATE SET cfp = excluded.cfp"
                ))
                .map_err(err)?;
            for (part, cfp) in rows {
                stmt.execute(params![part.as_str(), cfp.to_string(), None::<String>])
                    .map_err(err)?;
            }
        }
        tx.commit().map_err(err)?;
        Ok(rows.len())
    }
}
