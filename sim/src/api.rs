//! Public API for the battlefield.
//!
//! [`Battlefield`] owns the ECS world and two schedules:
//!
//! - **modifier**: spatial hashing followed by the five resolver stages
//!   (terrain, projectiles, troop collisions, melee, patience). One run is
//!   one tick of combat resolution.
//! - **update**: units move and fire, projectiles fly.
//!
//! Rendering, AI and input read the battlefield between ticks only.

use crate::config::{GameSettings, SimConfig};
use crate::error::{BattleError, Result};
use crate::projectile::{ObjectHasher, Projectile};
use crate::rng::SimRng;
use crate::roster::{DeadTroops, SimTick, UnitRoster};
use crate::spatial::{hash_objects_system, TroopHasher};
use crate::systems::*;
use crate::terrain::{Terrain, TerrainResource};
use crate::unit::{Unit, UnitId, UnitSpec};
use crate::world::BattleSnapshot;
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use tracing::debug;

/// The battlefield container.
pub struct Battlefield {
    world: World,
    modifier: Schedule,
    update: Schedule,
}

impl Battlefield {
    pub fn new() -> Self {
        Self::with_config(SimConfig::default(), GameSettings::default())
    }

    /// Create a battlefield with custom tuning and policy switches on flat ground.
    pub fn with_config(config: SimConfig, settings: GameSettings) -> Self {
        let mut world = World::new();

        world.insert_resource(SimRng::seed_from_u64(config.seed));
        world.insert_resource(TroopHasher::new(config.troop_cell_size));
        world.insert_resource(ObjectHasher::new(config.object_cell_size));
        world.insert_resource(UnitRoster::default());
        world.insert_resource(DeadTroops::default());
        world.insert_resource(SimTick(0));
        world.insert_resource(TerrainResource::default());
        world.insert_resource(settings);
        world.insert_resource(config);

        // Each stage reads what the previous one wrote.
        let mut modifier = Schedule::default();
        modifier.set_executor_kind(ExecutorKind::SingleThreaded);
        modifier.add_systems(
            (
                hash_objects_system,
                terrain_speed_system,
                object_collision_system,
                troop_collision_system,
                melee_combat_system,
                unit_patience_system,
            )
                .chain(),
        );

        let mut update = Schedule::default();
        update.set_executor_kind(ExecutorKind::SingleThreaded);
        update.add_systems((unit_update_system, projectile_update_system).chain());

        Self {
            world,
            modifier,
            update,
        }
    }

    /// Replace the ground the battle is fought on.
    pub fn with_terrain(mut self, terrain: impl Terrain + 'static) -> Self {
        self.world.insert_resource(TerrainResource::new(terrain));
        self
    }

    /// Add a unit to the battle, returning its id.
    pub fn add_unit(&mut self, spec: UnitSpec) -> Result<UnitId> {
        self.world.resource_scope(|world, mut rng: Mut<SimRng>| {
            world.resource_mut::<UnitRoster>().add(spec, &mut rng.0)
        })
    }

    /// Order a unit to a new goal pose, keeping its formation.
    pub fn move_unit(&mut self, id: UnitId, x: f32, y: f32, angle: f32) -> Result<()> {
        self.world.resource_scope(|world, mut rng: Mut<SimRng>| {
            let config = world.resource::<SimConfig>().clone();
            let mut roster = world.resource_mut::<UnitRoster>();
            roster
                .try_unit_mut(id)?
                .move_formation_kept_to(x, y, angle, &config, &mut rng.0);
            Ok(())
        })
    }

    /// Point a ranged unit at an enemy unit, or clear its target with `None`.
    pub fn assign_ranged_target(&mut self, id: UnitId, target: Option<UnitId>) -> Result<()> {
        let mut roster = self.world.resource_mut::<UnitRoster>();
        if let Some(target) = target {
            let target_faction = roster.try_unit(target)?.faction;
            let faction = roster.try_unit(id)?.faction;
            if faction == target_faction {
                return Err(BattleError::FriendlyTarget {
                    unit: id,
                    target,
                    faction,
                });
            }
        }
        if !roster.try_unit_mut(id)?.set_ranged_target(target) {
            return Err(BattleError::NotRanged(id));
        }
        debug!(unit = id.0, target = ?target.map(|t| t.0), "Ranged target assigned");
        Ok(())
    }

    /// Resolve one tick of combat: hash, then the five modifier stages.
    pub fn modify_objects(&mut self) {
        self.modifier.run(&mut self.world);
        self.world.resource_mut::<SimTick>().increment();
    }

    /// Run a full tick: combat resolution, then unit and projectile updates.
    pub fn step(&mut self) {
        self.modifier.run(&mut self.world);
        self.update.run(&mut self.world);
        self.world.resource_mut::<SimTick>().increment();
    }

    pub fn troop_hasher(&self) -> &TroopHasher {
        self.world.resource::<TroopHasher>()
    }

    pub fn object_hasher(&self) -> &ObjectHasher {
        self.world.resource::<ObjectHasher>()
    }

    /// Projectiles in flight around `(x, y)`, bucketed as of the last step.
    pub fn projectiles_near(&self, x: f32, y: f32) -> Vec<&Projectile> {
        self.object_hasher().get_objects_near(x, y)
    }

    pub fn roster(&self) -> &UnitRoster {
        self.world.resource::<UnitRoster>()
    }

    pub fn unit(&self, id: UnitId) -> Result<&Unit> {
        self.roster().try_unit(id)
    }

    pub fn alive_units(&self) -> &[UnitId] {
        self.roster().alive_units()
    }

    pub fn dead_units(&self) -> &[UnitId] {
        self.roster().dead_units()
    }

    pub fn dead_troops(&self) -> &DeadTroops {
        self.world.resource::<DeadTroops>()
    }

    pub fn current_tick(&self) -> u64 {
        self.world.resource::<SimTick>().0
    }

    pub fn snapshot(&self) -> BattleSnapshot {
        BattleSnapshot::capture(
            self.current_tick(),
            self.roster(),
            self.object_hasher(),
            self.dead_troops(),
        )
    }

    pub fn snapshot_json(&self) -> std::result::Result<String, serde_json::Error> {
        self.snapshot().to_json()
    }

    /// Direct access to the ECS world, for collaborators that add their own resources.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for Battlefield {
    fn default() -> Self {
        Self::new()
    }
}
