//! Per-tick unit and projectile updates, run after the modifier pipeline.

use crate::config::SimConfig;
use crate::projectile::ObjectHasher;
use crate::ranged::{weapon, Launch};
use crate::rng::SimRng;
use crate::roster::{DeadTroops, SimTick, UnitRoster};
use crate::spatial::TroopHasher;
use crate::systems::resolve_hitscan;
use bevy_ecs::prelude::*;
use tracing::trace;

/// Move every alive unit and let its troops act.
///
/// Shots are collected first and launched once every unit has moved:
/// projectiles join the object pool, instant shots are resolved against the
/// troop hash straight away.
pub fn unit_update_system(
    config: Res<SimConfig>,
    tick: Res<SimTick>,
    hasher: Res<TroopHasher>,
    mut rng: ResMut<SimRng>,
    mut objects: ResMut<ObjectHasher>,
    mut roster: ResMut<UnitRoster>,
    mut corpses: ResMut<DeadTroops>,
) {
    let mut shots = Vec::new();
    let ids = roster.alive_units().to_vec();
    for id in ids {
        let (opponent, ranged_target) = {
            let unit = roster.unit(id);
            let opponent = unit
                .opponent
                .and_then(|o| roster.get(o))
                .filter(|o| !o.is_dead())
                .map(|o| o.anchor);
            (opponent, unit.ranged_target())
        };
        let (unit, target) = roster.pair_mut(id, ranged_target);
        shots.extend(unit.update(opponent, target, &config, &mut rng.0));
    }

    if !shots.is_empty() {
        trace!(shots = shots.len(), tick = tick.0, "Volley");
    }
    for shot in shots {
        if let Some(target) = roster.get_mut(shot.target_unit) {
            target.under_fire = config.under_fire_memory;
        }
        match weapon(shot.stats.weapon).launch(&shot) {
            Launch::Projectile(projectile) => objects.spawn(projectile),
            Launch::Hitscan(line) => {
                resolve_hitscan(&line, &config, tick.0, &hasher, &mut roster, &mut corpses);
            }
        }
    }
}

/// Fly projectiles and drop the spent ones.
pub fn projectile_update_system(mut objects: ResMut<ObjectHasher>) {
    objects.update();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, UnitKind, UnitState};
    use crate::config::GameSettings;
    use crate::unit::{UnitId, UnitSpec};

    fn setup(specs: &[UnitSpec]) -> World {
        let mut world = World::new();
        let mut rng = SimRng::seed_from_u64(21);
        let mut roster = UnitRoster::default();
        for spec in specs {
            roster.add(spec.clone(), &mut rng.0).unwrap();
        }
        let mut hasher = TroopHasher::default();
        hasher.hash_objects(&mut roster, &GameSettings::default());
        world.insert_resource(roster);
        world.insert_resource(hasher);
        world.insert_resource(rng);
        world.insert_resource(SimConfig::default());
        world.insert_resource(SimTick(0));
        world.insert_resource(ObjectHasher::default());
        world.insert_resource(DeadTroops::default());
        world
    }

    fn schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems((unit_update_system, projectile_update_system).chain());
        schedule
    }

    #[test]
    fn test_archers_loose_arrows_at_target() {
        let mut world = setup(&[
            UnitSpec::new(UnitKind::Archer, Faction::Blue, 2, 1),
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 2, 2).at(20.0, 0.0, std::f32::consts::PI),
        ]);
        world.resource_mut::<UnitRoster>().unit_mut(UnitId(0)).set_ranged_target(Some(UnitId(1)));

        let ranged = UnitKind::Archer.stats().ranged.unwrap();
        let mut schedule = schedule();
        let mut loosed = false;
        for _ in 0..(ranged.boredom_limit + ranged.reload_delay + 2) {
            schedule.run(&mut world);
            if !world.resource::<ObjectHasher>().is_empty() {
                loosed = true;
                break;
            }
        }
        assert!(loosed);
        assert!(world.resource::<UnitRoster>().unit(UnitId(1)).under_fire > 0);
    }

    #[test]
    fn test_out_of_range_target_is_ignored() {
        let mut world = setup(&[
            UnitSpec::new(UnitKind::Archer, Faction::Blue, 2, 1),
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 2, 2).at(200.0, 0.0, 0.0),
        ]);
        world.resource_mut::<UnitRoster>().unit_mut(UnitId(0)).set_ranged_target(Some(UnitId(1)));
        let mut schedule = schedule();
        for _ in 0..300 {
            schedule.run(&mut world);
        }
        assert!(world.resource::<ObjectHasher>().is_empty());
    }

    #[test]
    fn test_musket_volley_hits_instantly() {
        let mut world = setup(&[
            UnitSpec::new(UnitKind::Musketeer, Faction::Blue, 1, 1),
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 1).at(10.0, 0.0, std::f32::consts::PI),
        ]);
        {
            let mut roster = world.resource_mut::<UnitRoster>();
            roster.unit_mut(UnitId(0)).set_ranged_target(Some(UnitId(1)));
            roster.unit_mut(UnitId(0)).stats.ranged.as_mut().unwrap().scatter = 0.0;
        }
        let ranged = UnitKind::Musketeer.stats().ranged.unwrap();
        let mut schedule = schedule();
        for _ in 0..(ranged.boredom_limit + ranged.reload_delay + 2) {
            schedule.run(&mut world);
        }
        let roster = world.resource::<UnitRoster>();
        assert!(roster.unit(UnitId(1)).troop(0).hp < 100.0 || roster.unit(UnitId(1)).is_dead());
        assert!(world.resource::<ObjectHasher>().is_empty());
    }

    #[test]
    fn test_fighting_unit_chases_opponent() {
        let mut world = setup(&[
            UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 2, 2),
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 2, 2).at(6.0, 0.0, std::f32::consts::PI),
        ]);
        world.resource_mut::<UnitRoster>().unit_mut(UnitId(0)).lock_opponent(UnitId(1));
        let mut schedule = schedule();
        for _ in 0..10 {
            schedule.run(&mut world);
        }
        let roster = world.resource::<UnitRoster>();
        let unit = roster.unit(UnitId(0));
        assert_eq!(unit.state, UnitState::Fighting);
        assert!(unit.anchor.x > 0.5);
    }

    #[test]
    fn test_dead_opponent_releases_lock() {
        let mut world = setup(&[
            UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1),
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 1).at(3.0, 0.0, 0.0),
        ]);
        {
            let mut roster = world.resource_mut::<UnitRoster>();
            roster.unit_mut(UnitId(0)).patience = 0;
            roster.unit_mut(UnitId(0)).lock_opponent(UnitId(1));
            roster.unit_mut(UnitId(1)).damage_troop(0, f32::MAX);
        }
        schedule().run(&mut world);
        let roster = world.resource::<UnitRoster>();
        let unit = roster.unit(UnitId(0));
        assert_eq!(unit.state, UnitState::Standing);
        assert_eq!(unit.opponent, None);
        assert_eq!(unit.patience, unit.stats.patience);
    }
}
