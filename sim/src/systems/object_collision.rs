//! Stage 2: projectiles striking troops, plus instant line shots.

use crate::config::SimConfig;
use crate::math::dist_sq;
use crate::projectile::{ObjectHasher, Projectile};
use crate::ranged::HitscanShot;
use crate::roster::{DeadTroops, SimTick, UnitRoster};
use crate::spatial::TroopHasher;
use crate::systems::nearest_troop;
use crate::troop::TroopKey;
use bevy_ecs::prelude::*;
use tracing::trace;

/// Resolve every live, impactful projectile against nearby troops.
///
/// Splash projectiles damage every troop inside the radius and go inert.
/// Other projectiles hit the nearest troop whose body they are over. A troop
/// that survives is knocked back and carries the projectile for a while.
pub fn object_collision_system(
    config: Res<SimConfig>,
    tick: Res<SimTick>,
    hasher: Res<TroopHasher>,
    mut objects: ResMut<ObjectHasher>,
    mut roster: ResMut<UnitRoster>,
    mut corpses: ResMut<DeadTroops>,
) {
    for projectile in objects.objects_mut() {
        if !projectile.is_alive() || !projectile.is_impactful() {
            continue;
        }
        match projectile.splash_radius {
            Some(radius) => {
                splash(projectile, radius, &config, tick.0, &hasher, &mut roster, &mut corpses);
                projectile.set_alive(false);
            }
            None => direct_hit(projectile, &config, tick.0, &hasher, &mut roster, &mut corpses),
        }
    }
}

fn direct_hit(
    projectile: &mut Projectile,
    config: &SimConfig,
    tick: u64,
    hasher: &TroopHasher,
    roster: &mut UnitRoster,
    corpses: &mut DeadTroops,
) {
    let candidates = hasher.get_collision_objects(projectile.x, projectile.y);
    let Some(key) = nearest_troop(
        roster,
        &candidates,
        projectile.x,
        projectile.y,
        f32::INFINITY,
        |_| true,
    ) else {
        return;
    };

    let size = roster.unit(key.unit).stats.troop_size;
    let troop = roster.troop(key);
    if dist_sq(projectile.x, projectile.y, troop.x, troop.y) > size * size / 4.0 {
        return;
    }

    projectile.set_alive(false);
    let killed = strike(roster, key, projectile.damage, config, tick, corpses);
    if !killed {
        let troop = roster.troop_mut(key);
        let (dx, dy) = (projectile.angle.cos(), projectile.angle.sin());
        troop.apply_impulse(dx * config.knockback, dy * config.knockback);
        troop.absorb(
            projectile.kind,
            projectile.x,
            projectile.y,
            projectile.angle,
            config.carried_object_ttl,
        );
    }
    trace!(?key, killed, "Projectile hit");
}

fn splash(
    projectile: &Projectile,
    radius: f32,
    config: &SimConfig,
    tick: u64,
    hasher: &TroopHasher,
    roster: &mut UnitRoster,
    corpses: &mut DeadTroops,
) {
    let victims: Vec<TroopKey> = hasher
        .get_collision_objects_within(projectile.x, projectile.y, radius)
        .into_iter()
        .filter(|e| {
            let troop = roster.troop(e.key);
            troop.is_alive() && dist_sq(projectile.x, projectile.y, troop.x, troop.y) <= radius * radius
        })
        .map(|e| e.key)
        .collect();

    for key in victims {
        strike(roster, key, projectile.damage, config, tick, corpses);
    }
}

/// Damage a troop and mark its unit as under fire.
fn strike(
    roster: &mut UnitRoster,
    key: TroopKey,
    damage: f32,
    config: &SimConfig,
    tick: u64,
    corpses: &mut DeadTroops,
) -> bool {
    roster.unit_mut(key.unit).under_fire = config.under_fire_memory;
    roster.damage_troop(key, damage, tick, corpses)
}

/// Resolve an instant shot: the first enemy troop along the line is hit.
pub fn resolve_hitscan(
    shot: &HitscanShot,
    config: &SimConfig,
    tick: u64,
    hasher: &TroopHasher,
    roster: &mut UnitRoster,
    corpses: &mut DeadTroops,
) -> Option<TroopKey> {
    let (dx, dy) = (shot.x2 - shot.x1, shot.y2 - shot.y1);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return None;
    }

    let mut best: Option<(f32, usize, TroopKey)> = None;
    for entry in hasher.get_collision_objects_from_line(shot.x1, shot.y1, shot.x2, shot.y2) {
        if entry.faction == shot.faction {
            continue;
        }
        let troop = roster.troop(entry.key);
        if !troop.is_alive() {
            continue;
        }
        let t = ((troop.x - shot.x1) * dx + (troop.y - shot.y1) * dy) / len_sq;
        if !(0.0..=1.0).contains(&t) {
            continue;
        }
        let (px, py) = (shot.x1 + dx * t, shot.y1 + dy * t);
        let radius = roster.unit(entry.key.unit).stats.collision_radius();
        if dist_sq(px, py, troop.x, troop.y) > radius * radius {
            continue;
        }
        let better = match &best {
            None => true,
            Some((bt, bs, bk)) => t
                .total_cmp(bt)
                .then(troop.slot.cmp(bs))
                .then(entry.key.unit.cmp(&bk.unit))
                .is_lt(),
        };
        if better {
            best = Some((t, troop.slot, entry.key));
        }
    }

    let (_, _, key) = best?;
    strike(roster, key, shot.damage, config, tick, corpses);
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, UnitKind, UnitStats, WeaponKind};
    use crate::config::GameSettings;
    use crate::rng::SimRng;
    use crate::spatial::TroopEntry;
    use crate::unit::{UnitId, UnitSpec};

    fn world_with(specs: &[UnitSpec]) -> World {
        let mut world = World::new();
        let mut rng = SimRng::seed_from_u64(4);
        let mut roster = UnitRoster::default();
        for spec in specs {
            roster.add(spec.clone(), &mut rng.0).unwrap();
        }
        let mut hasher = TroopHasher::default();
        hasher.hash_objects(&mut roster, &GameSettings::default());
        world.insert_resource(roster);
        world.insert_resource(hasher);
        world.insert_resource(ObjectHasher::default());
        world.insert_resource(DeadTroops::default());
        world.insert_resource(SimTick(3));
        world.insert_resource(SimConfig::default());
        world
    }

    /// Rehash every troop, last slot first.
    fn rehash_reversed(world: &mut World) {
        world.resource_scope(|world, mut hasher: Mut<TroopHasher>| {
            let roster = world.resource::<UnitRoster>();
            let keys: Vec<TroopKey> = hasher.active_troops().iter().rev().copied().collect();
            hasher.clear();
            for key in keys {
                let troop = roster.troop(key);
                hasher.insert(TroopEntry {
                    key,
                    x: troop.x,
                    y: troop.y,
                    faction: troop.faction,
                });
            }
        });
    }

    /// Two red troops side by side, `spacing` apart and centred on `(x, 0)`.
    fn red_pair(x: f32, spacing: f32) -> UnitSpec {
        let stats = UnitStats {
            spacing,
            ..UnitKind::Swordsman.stats()
        };
        UnitSpec::new(UnitKind::Swordsman, Faction::Red, 2, 1)
            .at(x, 0.0, 0.0)
            .with_stats(stats)
    }

    fn shooter() -> TroopKey {
        TroopKey { unit: UnitId(9), index: 0 }
    }

    fn landed(kind: WeaponKind, at: (f32, f32), damage: f32, splash: Option<f32>) -> Projectile {
        let mut p = Projectile::launch(kind, Faction::Blue, shooter(), (at.0 - 1.0, at.1), at, 1.0, damage, splash);
        p.advance();
        p
    }

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(object_collision_system);
        schedule.run(world);
    }

    #[test]
    fn test_arrow_wounds_and_sticks() {
        let mut world = world_with(&[UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 1)]);
        world
            .resource_mut::<ObjectHasher>()
            .spawn(landed(WeaponKind::Bow, (0.2, 0.0), 30.0, None));
        run(&mut world);

        let roster = world.resource::<UnitRoster>();
        let troop = roster.unit(UnitId(0)).troop(0);
        assert_eq!(troop.hp, 70.0);
        assert_eq!(troop.carried.len(), 1);
        assert!(troop.vx > 0.0);
        assert_eq!(roster.unit(UnitId(0)).under_fire, SimConfig::default().under_fire_memory);
        assert!(!world.resource::<ObjectHasher>().objects()[0].is_alive());
    }

    #[test]
    fn test_arrow_misses_outside_body() {
        let mut world = world_with(&[UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 1)]);
        world
            .resource_mut::<ObjectHasher>()
            .spawn(landed(WeaponKind::Bow, (0.8, 0.0), 30.0, None));
        run(&mut world);

        assert_eq!(world.resource::<UnitRoster>().unit(UnitId(0)).troop(0).hp, 100.0);
        assert!(world.resource::<ObjectHasher>().objects()[0].is_alive());
    }

    #[test]
    fn test_lethal_arrow_leaves_corpse_and_reflows() {
        let mut world = world_with(&[UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 2)]);
        world
            .resource_mut::<ObjectHasher>()
            .spawn(landed(WeaponKind::Bow, (0.0, 0.0), 500.0, None));
        run(&mut world);

        assert_eq!(world.resource::<DeadTroops>().len(), 1);
        assert_eq!(world.resource::<DeadTroops>().corpses()[0].tick, 3);
        let unit = world.resource::<UnitRoster>().unit(UnitId(0));
        assert!(unit.slot_alive(0));
        assert!(!unit.slot_alive(1));
    }

    #[test]
    fn test_stone_splashes_everyone_in_radius() {
        let mut world = world_with(&[UnitSpec::new(UnitKind::Swordsman, Faction::Red, 3, 1)]);
        world
            .resource_mut::<ObjectHasher>()
            .spawn(landed(WeaponKind::Catapult, (0.0, 0.0), 10.0, Some(1.5)));
        run(&mut world);

        let unit = world.resource::<UnitRoster>().unit(UnitId(0));
        assert!(unit.troops().iter().all(|t| t.hp == 90.0));
        assert!(!world.resource::<ObjectHasher>().objects()[0].is_alive());
    }

    #[test]
    fn test_hitscan_hits_first_enemy_on_line() {
        let mut world = world_with(&[
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 3).at(10.0, 0.0, std::f32::consts::PI),
            UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1).at(5.0, 0.0, 0.0),
        ]);
        let shot = HitscanShot {
            shooter: shooter(),
            faction: Faction::Blue,
            x1: 0.0,
            y1: 0.0,
            x2: 25.0,
            y2: 0.0,
            damage: 20.0,
        };
        let config = SimConfig::default();
        world.resource_scope(|world, mut roster: Mut<UnitRoster>| {
            let hasher = world.resource::<TroopHasher>();
            let mut corpses = DeadTroops::default();
            let hit = resolve_hitscan(&shot, &config, 1, hasher, &mut roster, &mut corpses).unwrap();
            // Front troop of the red column, facing the shooter.
            assert_eq!(hit.unit, UnitId(0));
            assert!((roster.troop(hit).x - 10.0).abs() < 1e-4);
            assert_eq!(roster.troop(hit).hp, 80.0);
            // Own faction in the way is ignored.
            assert_eq!(roster.unit(UnitId(1)).troop(0).hp, 100.0);
        });
    }

    #[test]
    fn test_equidistant_arrow_hits_lower_slot() {
        let mut world = world_with(&[red_pair(0.0, 0.8)]);
        rehash_reversed(&mut world);
        world
            .resource_mut::<ObjectHasher>()
            .spawn(landed(WeaponKind::Bow, (0.0, 0.0), 30.0, None));
        run(&mut world);

        let unit = world.resource::<UnitRoster>().unit(UnitId(0));
        assert_eq!(unit.slot_troop(0).hp, 70.0);
        assert_eq!(unit.slot_troop(1).hp, 100.0);
    }

    #[test]
    fn test_hitscan_tie_goes_to_lower_slot() {
        let mut world = world_with(&[red_pair(10.0, 0.6)]);
        rehash_reversed(&mut world);
        let shot = HitscanShot {
            shooter: shooter(),
            faction: Faction::Blue,
            x1: 0.0,
            y1: 0.0,
            x2: 25.0,
            y2: 0.0,
            damage: 20.0,
        };
        let config = SimConfig::default();
        world.resource_scope(|world, mut roster: Mut<UnitRoster>| {
            let hasher = world.resource::<TroopHasher>();
            let mut corpses = DeadTroops::default();
            let hit = resolve_hitscan(&shot, &config, 1, hasher, &mut roster, &mut corpses).unwrap();
            assert_eq!(roster.troop(hit).slot, 0);
            assert_eq!(roster.unit(UnitId(0)).slot_troop(1).hp, 100.0);
        });
    }
}
