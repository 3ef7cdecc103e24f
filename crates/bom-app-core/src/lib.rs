// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for the `bom-cfp` tools (config, shard
//! endpoints, state-change reports). Keeps the binary thin and storage-agnostic.

pub mod config;
pub mod report;
pub mod shards;

pub use config::{ConfigError, ConfigService, ConfigStore};
pub use report::{read_state_change_report, ReportError, StateChangeReport};
pub use shards::{ShardEndpointConfig, ShardsConfig, SHARDS_CONFIG_KEY};
