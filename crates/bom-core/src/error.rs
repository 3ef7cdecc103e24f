// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fatal computation errors.
use thiserror::Error;

use crate::ident::PartId;

/// Errors that abort a parts-tree computation.
///
/// None of these leave partial results behind: the caller receives either a
/// complete [`Computation`](crate::Computation) or one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The explosion is not a DAG; `part` was re-entered while still on the
    /// traversal path.
    #[error("[BOM_CYCLE] cycle detected at part {part}")]
    CycleDetected {
        /// First part found on its own descent path.
        part: PartId,
    },
    /// An aggregated quantity no longer fits in 128 bits.
    #[error("[BOM_QTY_OVERFLOW] quantity overflow below part {part}")]
    QuantityOverflow {
        /// Root whose quantity row overflowed.
        part: PartId,
    },
    /// The exact CO2 sum for a part overflowed the fixed-point range.
    #[error("[BOM_CFP_OVERFLOW] carbon footprint overflow at part {part}")]
    CfpOverflow {
        /// Part whose footprint overflowed.
        part: PartId,
    },
}
