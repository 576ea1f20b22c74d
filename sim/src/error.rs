//! Error types for the battlefield simulation.
//!
//! Only misuse of the public API is reported through [`BattleError`].
//! Broken formation bookkeeping is a programming error and panics instead.

use crate::components::Faction;
use crate::unit::UnitId;
use thiserror::Error;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Errors returned by the battlefield API.
#[derive(Debug, Error)]
pub enum BattleError {
    /// A unit was requested with no formation slots.
    #[error("Formation must have at least one slot, got {width}x{depth}")]
    EmptyFormation {
        /// Requested width.
        width: usize,
        /// Requested depth.
        depth: usize,
    },

    /// A unit id does not exist in the roster.
    #[error("Unknown unit: {0:?}")]
    UnknownUnit(UnitId),

    /// A unit without a ranged weapon was given a ranged target.
    #[error("Unit {0:?} has no ranged weapon")]
    NotRanged(UnitId),

    /// A ranged target belongs to the shooter's own faction.
    #[error("Unit {unit:?} cannot target {target:?}: both are {faction:?}")]
    FriendlyTarget {
        /// Shooting unit.
        unit: UnitId,
        /// Requested target.
        target: UnitId,
        /// Shared faction.
        faction: Faction,
    },

    /// A heightmap does not match its grid.
    #[error("Terrain expects {expected} heights, got {actual}")]
    InvalidTerrain {
        /// Cells in the grid.
        expected: usize,
        /// Heights supplied.
        actual: usize,
    },

    /// Settings could not be parsed.
    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] serde_json::Error),
}
