// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for the BOM crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`fixtures`] - BOM fixture builder, seeded random DAGs, shuffling
//! - [`reference`] - Naive path-enumeration quantities and recursive hashes

pub mod config;
pub mod fixtures;
pub mod reference;

pub use config::InMemoryConfigStore;
pub use fixtures::{random_dag, shuffle, BomFixture, XorShift64};
pub use reference::{explosion_nodes, naive_cfp, naive_hash, path_quantity};
