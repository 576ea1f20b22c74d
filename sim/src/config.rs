//! Simulation configuration.
//!
//! `SimConfig` holds numeric tuning for the tick pipeline. `GameSettings`
//! holds the boolean policy switches that select algorithm variants. Both
//! are ECS resources read once per tick.

use crate::error::Result;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Numeric tuning for the battlefield.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the simulation RNG.
    pub seed: u64,
    /// Edge length of a troop hash cell in world units.
    pub troop_cell_size: f32,
    /// Edge length of a projectile hash cell in world units.
    pub object_cell_size: f32,
    /// Spring constant for pushes between troops of the same faction.
    pub ally_spring: f32,
    /// Spring constant for pushes between opposing troops.
    pub enemy_spring: f32,
    /// Push multiplier applied when exactly one side of a collision is cavalry.
    pub cavalry_push_factor: f32,
    /// Fraction of the gap to the pushed speed recovered per tick by infantry.
    pub infantry_speed_recovery: f32,
    /// Fraction of the gap to the pushed speed recovered per tick by cavalry.
    pub cavalry_speed_recovery: f32,
    /// Bearing change (radians) beyond which a move order turns the formation around.
    pub u_turn_threshold: f32,
    /// Ticks a unit counts as under fire after being shot at.
    pub under_fire_memory: u32,
    /// Lifetime in ticks of a projectile absorbed by a troop.
    pub carried_object_ttl: u32,
    /// Impulse applied along a projectile's travel angle to a surviving target.
    pub knockback: f32,
    /// Scales the terrain slope into a walking speed modifier.
    pub slope_speed_factor: f32,
    /// Max anchor rotation per tick (radians).
    pub unit_rotation_speed: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            troop_cell_size: 4.0,
            object_cell_size: 8.0,
            ally_spring: 0.05,
            enemy_spring: 0.15,
            cavalry_push_factor: 5.0,
            infantry_speed_recovery: 0.8,
            cavalry_speed_recovery: 0.9,
            u_turn_threshold: std::f32::consts::FRAC_PI_4 * 3.0,
            under_fire_memory: 60,
            carried_object_ttl: 300,
            knockback: 0.05,
            slope_speed_factor: 2.0,
            unit_rotation_speed: 0.05,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Policy switches provided by the game settings collaborator.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    /// Hash cavalry troops even when their unit is not active.
    pub cavalry_collision: bool,
    /// Resolve troop collisions outward from formation borders instead of for every troop.
    pub border_inward_collision: bool,
    /// Only units under fire, in contact, or fighting are active (plus bounding-box contacts).
    pub collision_only_in_combat: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            cavalry_collision: true,
            border_inward_collision: true,
            collision_only_in_combat: false,
        }
    }
}

impl GameSettings {
    /// Parse settings from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_partial_json_keeps_defaults() {
        let settings = GameSettings::from_json(r#"{ "collision_only_in_combat": true }"#).unwrap();
        assert!(settings.collision_only_in_combat);
        assert!(settings.cavalry_collision);
        assert!(settings.border_inward_collision);
    }

    #[test]
    fn test_invalid_settings_json() {
        assert!(GameSettings::from_json("{ not json").is_err());
    }

    #[test]
    fn test_config_override() {
        let config = SimConfig::from_json(r#"{ "seed": 7, "troop_cell_size": 6.0 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.troop_cell_size, 6.0);
        assert_eq!(config.under_fire_memory, SimConfig::default().under_fire_memory);
    }
}
