// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shard endpoint configuration (`shards` config key).

use std::path::PathBuf;

use bom_core::ShardId;
use serde::{Deserialize, Serialize};

/// Config key under which [`ShardsConfig`] is stored.
pub const SHARDS_CONFIG_KEY: &str = "shards";

/// Default SQLite busy timeout, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Where one shard's tables live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShardEndpointConfig {
    /// SQLite database file holding `{S}_parts_tree`, `{S}_cfpval` and
    /// `{S}_assembler`.
    pub path: PathBuf,
    /// How long a connection waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl ShardEndpointConfig {
    /// Endpoint at `path` with the default busy timeout.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// The three shard endpoints, keyed by shard letter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShardsConfig {
    /// Shard `A`.
    #[serde(rename = "A")]
    pub a: ShardEndpointConfig,
    /// Shard `B`.
    #[serde(rename = "B")]
    pub b: ShardEndpointConfig,
    /// Shard `C`.
    #[serde(rename = "C")]
    pub c: ShardEndpointConfig,
}

impl ShardsConfig {
    /// Endpoint for `shard`.
    pub fn endpoint(&self, shard: ShardId) -> &ShardEndpointConfig {
        match shard {
            ShardId::A => &self.a,
            ShardId::B => &self.b,
            ShardId::C => &self.c,
        }
    }

    /// Conventional layout: `dir/A.db`, `dir/B.db`, `dir/C.db`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let at = |s: ShardId| ShardEndpointConfig::at(dir.join(format!("{s}.db")));
        Self {
            a: at(ShardId::A),
            b: at(ShardId::B),
            c: at(ShardId::C),
        }
    }
}
