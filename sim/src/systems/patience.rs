//! Stage 5: contact bookkeeping and forced melee.
//!
//! A unit touching an enemy loses one point of patience per tick. When its
//! patience runs out it locks onto the enemy unit it touches and fights.

use crate::components::UnitState;
use crate::math::dist_sq;
use crate::roster::UnitRoster;
use crate::spatial::TroopHasher;
use crate::unit::UnitId;
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;
use tracing::info;

/// Map every unit in contact to the first enemy unit it was seen touching.
///
/// A pair touches when an alive troop has an alive enemy troop within its
/// melee reach. Contact is recorded for both units of the pair.
pub fn touching_units(roster: &UnitRoster, hasher: &TroopHasher) -> BTreeMap<UnitId, UnitId> {
    let mut touching = BTreeMap::new();
    for &key in hasher.active_troops() {
        let troop = roster.troop(key);
        if !troop.is_alive() {
            continue;
        }
        let reach = roster.unit(key.unit).stats.reach();
        for entry in hasher.get_collision_objects_for(key, troop.x, troop.y) {
            if entry.faction == troop.faction || entry.key.unit == key.unit {
                continue;
            }
            let other = roster.troop(entry.key);
            if !other.is_alive() || dist_sq(troop.x, troop.y, other.x, other.y) > reach * reach {
                continue;
            }
            touching.entry(key.unit).or_insert(entry.key.unit);
            touching.entry(entry.key.unit).or_insert(key.unit);
        }
    }
    touching
}

/// Refresh contact flags, drain patience and start melee.
///
/// Under-fire timers tick down here, after every stage that reads them.
pub fn unit_patience_system(hasher: Res<TroopHasher>, mut roster: ResMut<UnitRoster>) {
    roster.drop_dead_units();
    let ids = roster.alive_units().to_vec();
    for &id in &ids {
        let unit = roster.unit_mut(id);
        unit.in_contact_with_enemy = false;
        unit.under_fire = unit.under_fire.saturating_sub(1);
    }

    for (id, enemy) in touching_units(&roster, &hasher) {
        let unit = roster.unit_mut(id);
        unit.in_contact_with_enemy = true;
        if unit.state == UnitState::Fighting {
            continue;
        }
        unit.patience = unit.patience.saturating_sub(1);
        if unit.patience == 0 {
            unit.lock_opponent(enemy);
            info!(unit = id.0, opponent = enemy.0, "Patience exhausted, engaging in melee");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, UnitKind, UnitStats};
    use crate::config::GameSettings;
    use crate::rng::SimRng;
    use crate::unit::UnitSpec;

    fn setup(patience: u32, gap: f32) -> World {
        let stats = UnitStats {
            patience,
            ..UnitKind::Swordsman.stats()
        };
        let mut world = World::new();
        let mut rng = SimRng::seed_from_u64(12);
        let mut roster = UnitRoster::default();
        roster
            .add(UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 2, 2).with_stats(stats), &mut rng.0)
            .unwrap();
        roster
            .add(
                UnitSpec::new(UnitKind::Swordsman, Faction::Red, 2, 2)
                    .at(gap, 0.0, std::f32::consts::PI)
                    .with_stats(stats),
                &mut rng.0,
            )
            .unwrap();
        world.insert_resource(roster);
        world.insert_resource(TroopHasher::default());
        world.insert_resource(GameSettings::default());
        world
    }

    fn run(world: &mut World, ticks: usize) {
        let mut schedule = Schedule::default();
        schedule.add_systems((crate::spatial::hash_objects_system, unit_patience_system).chain());
        for _ in 0..ticks {
            schedule.run(world);
        }
    }

    #[test]
    fn test_contact_drains_patience_until_melee() {
        let mut world = setup(3, 0.8);
        run(&mut world, 2);
        {
            let roster = world.resource::<UnitRoster>();
            let unit = roster.unit(UnitId(0));
            assert!(unit.in_contact_with_enemy);
            assert_eq!(unit.patience, 1);
            assert_ne!(unit.state, UnitState::Fighting);
        }
        run(&mut world, 1);
        let roster = world.resource::<UnitRoster>();
        for (id, enemy) in [(UnitId(0), UnitId(1)), (UnitId(1), UnitId(0))] {
            let unit = roster.unit(id);
            assert_eq!(unit.state, UnitState::Fighting);
            assert_eq!(unit.opponent, Some(enemy));
        }
    }

    #[test]
    fn test_no_contact_keeps_patience() {
        let mut world = setup(3, 10.0);
        run(&mut world, 5);
        let roster = world.resource::<UnitRoster>();
        let unit = roster.unit(UnitId(0));
        assert!(!unit.in_contact_with_enemy);
        assert_eq!(unit.patience, 3);
    }

    #[test]
    fn test_fighting_units_keep_lock() {
        let mut world = setup(1, 0.8);
        run(&mut world, 4);
        let roster = world.resource::<UnitRoster>();
        let unit = roster.unit(UnitId(0));
        assert_eq!(unit.state, UnitState::Fighting);
        assert_eq!(unit.patience, 0);
        assert!(unit.in_contact_with_enemy);
    }

    #[test]
    fn test_under_fire_fades_once_per_tick() {
        let mut world = setup(3, 10.0);
        world.resource_mut::<UnitRoster>().unit_mut(UnitId(0)).under_fire = 2;
        run(&mut world, 1);
        assert_eq!(world.resource::<UnitRoster>().unit(UnitId(0)).under_fire, 1);
        run(&mut world, 2);
        assert_eq!(world.resource::<UnitRoster>().unit(UnitId(0)).under_fire, 0);
    }

    #[test]
    fn test_wiped_out_units_are_dropped_first() {
        let mut world = setup(3, 0.8);
        {
            let mut roster = world.resource_mut::<UnitRoster>();
            for index in 0..4 {
                roster.unit_mut(UnitId(1)).damage_troop(index, f32::MAX);
            }
        }
        run(&mut world, 1);
        let roster = world.resource::<UnitRoster>();
        assert_eq!(roster.dead_units(), &[UnitId(1)]);
        assert!(!roster.unit(UnitId(0)).in_contact_with_enemy);
        assert_eq!(roster.unit(UnitId(0)).patience, 3);
    }
}
