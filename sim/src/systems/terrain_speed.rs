//! Stage 1: terrain effects on troop movement.

use crate::config::SimConfig;
use crate::roster::UnitRoster;
use crate::terrain::TerrainResource;
use bevy_ecs::prelude::*;

/// Lowest speed factor steep ground or bad footing can impose.
const MIN_TERRAIN_FACTOR: f32 = 0.1;
const MAX_TERRAIN_FACTOR: f32 = 2.0;

/// Refresh every alive troop's terrain speed factor.
///
/// Walking troops slow down uphill and speed up downhill along their
/// heading. Kinds that roll on slopes are pushed downhill instead.
pub fn terrain_speed_system(
    config: Res<SimConfig>,
    terrain: Option<Res<TerrainResource>>,
    mut roster: ResMut<UnitRoster>,
) {
    let Some(terrain) = terrain else {
        return;
    };
    let ids = roster.alive_units().to_vec();
    for id in ids {
        let unit = roster.unit_mut(id);
        let rolls = unit.stats.rolls_on_slopes;
        for index in 0..unit.troops().len() as u32 {
            let troop = unit.troop_mut(index);
            if !troop.is_alive() {
                continue;
            }
            let (dvx, dvy) = terrain.0.delta_vel_from_pos(troop.x, troop.y);
            let ground = terrain.0.movement_multiplier(troop.x, troop.y);
            if rolls {
                troop.apply_impulse(dvx, dvy);
                troop.terrain_factor = ground.clamp(MIN_TERRAIN_FACTOR, MAX_TERRAIN_FACTOR);
            } else {
                let along = troop.angle.cos() * dvx + troop.angle.sin() * dvy;
                let slope = 1.0 + along * config.slope_speed_factor;
                troop.terrain_factor = (ground * slope).clamp(MIN_TERRAIN_FACTOR, MAX_TERRAIN_FACTOR);
            }
        }
    }
}
