//! Phalanx - Simulation Core
//!
//! A deterministic, fixed-tick battlefield core for formation warfare.
//! Units are rectangular formations of troops; every tick a spatial hash is
//! rebuilt and five resolver stages run in order (terrain, projectiles,
//! troop collisions, melee, patience). Uses `bevy_ecs` resources and
//! schedules for the pipeline.

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod math;
pub mod projectile;
pub mod ranged;
pub mod rng;
pub mod roster;
pub mod spatial;
pub mod systems;
pub mod terrain;
pub mod troop;
pub mod unit;
pub mod world;

pub use api::Battlefield;
pub use components::*;
pub use config::{GameSettings, SimConfig};
pub use error::{BattleError, Result};
pub use math::Pose;
pub use projectile::{ObjectHasher, Projectile};
pub use ranged::{Ranged, Weapon};
pub use roster::{Corpse, DeadTroops, SimTick, UnitRoster};
pub use spatial::{TroopEntry, TroopHasher};
pub use terrain::{FlatTerrain, GroundType, Terrain, TerrainGrid, TerrainResource};
pub use troop::{Troop, TroopKey};
pub use unit::{Unit, UnitId, UnitSpec};
pub use world::BattleSnapshot;
