//! Stage 3: troops pushing each other apart.
//!
//! Overlapping troops exchange a spring impulse along the line between their
//! centers. Enemies push harder than allies, and cavalry shoves infantry far
//! more than the reverse.
//!
//! Two traversal orders are available. Flat mode visits every hashed troop.
//! Border mode starts from each formation's outline and only walks inward
//! while collisions keep happening, so the packed interior of a quiet
//! formation is never visited.

use crate::config::{GameSettings, SimConfig};
use crate::roster::UnitRoster;
use crate::spatial::TroopHasher;
use crate::troop::TroopKey;
use crate::unit::UnitId;
use bevy_ecs::prelude::*;
use std::collections::{HashMap, VecDeque};

/// Ally contacts above which border traversal keeps walking inward.
const CROWDED_ALLIES: usize = 5;

/// Collisions one troop took part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionCounts {
    pub allies: usize,
    pub enemies: usize,
}

/// Push one troop out of everything it overlaps and clamp its speed.
pub fn resolve_troop_collisions(
    roster: &mut UnitRoster,
    hasher: &TroopHasher,
    config: &SimConfig,
    key: TroopKey,
) -> CollisionCounts {
    let mut counts = CollisionCounts::default();
    let stats = roster.unit(key.unit).stats;
    let troop = roster.troop(key);
    if !troop.is_alive() {
        return counts;
    }
    let (x, y, faction) = (troop.x, troop.y, troop.faction);

    let mut ix = 0.0;
    let mut iy = 0.0;
    for entry in hasher.get_collision_objects_for(key, x, y) {
        let other_unit = roster.unit(entry.key.unit);
        let other = other_unit.troop(entry.key.index);
        if !other.is_alive() {
            continue;
        }
        let reach = stats.collision_radius() + other_unit.stats.collision_radius();
        let (dx, dy) = (x - other.x, y - other.y);
        let d2 = dx * dx + dy * dy;
        if d2 >= reach * reach {
            continue;
        }

        let d = d2.sqrt();
        let (nx, ny) = if d > 1e-6 {
            (dx / d, dy / d)
        } else if key < entry.key {
            (-1.0, 0.0)
        } else {
            (1.0, 0.0)
        };

        let allied = other.faction == faction;
        let mut k = if allied { config.ally_spring } else { config.enemy_spring };
        match (stats.is_cavalry, other_unit.stats.is_cavalry) {
            (false, true) => k *= config.cavalry_push_factor,
            (true, false) => k /= config.cavalry_push_factor,
            _ => {}
        }

        let overlap = reach - d;
        ix += nx * overlap * k;
        iy += ny * overlap * k;
        if allied {
            counts.allies += 1;
        } else {
            counts.enemies += 1;
        }
    }

    if counts.allies + counts.enemies > 0 {
        let recovery = if stats.is_cavalry {
            config.cavalry_speed_recovery
        } else {
            config.infantry_speed_recovery
        };
        let troop = roster.troop_mut(key);
        troop.apply_impulse(ix, iy);
        let (pvx, pvy) = troop.pushed_velocity();
        let target = (troop.desired_speed * troop.terrain_factor).min((pvx * pvx + pvy * pvy).sqrt());
        troop.speed += (target - troop.speed) * recovery;
    }
    counts
}

/// Resolve troop collisions in the order selected by the game settings.
pub fn troop_collision_system(
    config: Res<SimConfig>,
    settings: Res<GameSettings>,
    hasher: Res<TroopHasher>,
    mut roster: ResMut<UnitRoster>,
) {
    if settings.border_inward_collision {
        border_inward(&mut roster, &hasher, &config);
    } else {
        for &key in hasher.active_troops() {
            resolve_troop_collisions(&mut roster, &hasher, &config, key);
        }
    }
}

fn border_inward(roster: &mut UnitRoster, hasher: &TroopHasher, config: &SimConfig) {
    let mut visited: HashMap<UnitId, Vec<bool>> = HashMap::new();
    let mut queue = VecDeque::new();

    // Every hashed unit, including idle cavalry hashed for collision only.
    for &TroopKey { unit: id, .. } in hasher.active_troops() {
        if visited.contains_key(&id) {
            continue;
        }
        let unit = roster.unit(id);
        if unit.is_dead() {
            continue;
        }
        let border = unit.get_border_troops();
        queue.extend(
            border
                .iter()
                .enumerate()
                .filter(|&(_, &b)| b)
                .map(|(slot, _)| (id, slot)),
        );
        visited.insert(id, border);
    }

    while let Some((id, slot)) = queue.pop_front() {
        let key = roster.unit(id).slot_troop(slot).key();
        let counts = resolve_troop_collisions(roster, hasher, config, key);
        if counts.enemies == 0 && counts.allies <= CROWDED_ALLIES {
            continue;
        }

        let unit = roster.unit(id);
        let (row, col) = unit.row_col(slot);
        let Some(seen) = visited.get_mut(&id) else {
            continue;
        };
        for dr in -1i32..=1 {
            for dc in -1i32..=1 {
                let (r, c) = (row as i32 + dr, col as i32 + dc);
                if (dr, dc) == (0, 0)
                    || r < 0
                    || c < 0
                    || r as usize >= unit.depth()
                    || c as usize >= unit.width()
                {
                    continue;
                }
                let next = r as usize * unit.width() + c as usize;
                if seen[next] || !unit.slot_alive(next) {
                    continue;
                }
                seen[next] = true;
                queue.push_back((id, next));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Faction, UnitKind};
    use crate::rng::SimRng;
    use crate::unit::UnitSpec;

    fn setup(specs: &[UnitSpec], settings: GameSettings) -> World {
        let mut world = World::new();
        let mut rng = SimRng::seed_from_u64(6);
        let mut roster = UnitRoster::default();
        for spec in specs {
            roster.add(spec.clone(), &mut rng.0).unwrap();
        }
        let mut hasher = TroopHasher::default();
        hasher.hash_objects(&mut roster, &settings);
        world.insert_resource(roster);
        world.insert_resource(hasher);
        world.insert_resource(settings);
        world.insert_resource(SimConfig::default());
        world
    }

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(troop_collision_system);
        schedule.run(world);
    }

    fn flat() -> GameSettings {
        GameSettings {
            border_inward_collision: false,
            ..GameSettings::default()
        }
    }

    #[test]
    fn test_enemies_push_apart_symmetrically() {
        let mut world = setup(
            &[
                UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1),
                UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 1).at(0.5, 0.0, 0.0),
            ],
            flat(),
        );
        run(&mut world);
        let roster = world.resource::<UnitRoster>();
        let a = roster.unit(UnitId(0)).troop(0);
        let b = roster.unit(UnitId(1)).troop(0);
        // overlap 0.5 * enemy spring 0.15
        assert!((a.vx + 0.075).abs() < 1e-5);
        assert!((b.vx - 0.075).abs() < 1e-5);
    }

    #[test]
    fn test_allies_push_softer_than_enemies() {
        let mut world = setup(
            &[
                UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1),
                UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1).at(0.5, 0.0, 0.0),
            ],
            flat(),
        );
        run(&mut world);
        let a = world.resource::<UnitRoster>().unit(UnitId(0)).troop(0).vx;
        assert!((a + 0.025).abs() < 1e-5);
    }

    #[test]
    fn test_cavalry_shoves_infantry() {
        let mut world = setup(
            &[
                UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1),
                UnitSpec::new(UnitKind::Cavalry, Faction::Red, 1, 1).at(1.0, 0.0, 0.0),
            ],
            flat(),
        );
        run(&mut world);
        let roster = world.resource::<UnitRoster>();
        let infantry = roster.unit(UnitId(0)).troop(0).vx.abs();
        let cavalry = roster.unit(UnitId(1)).troop(0).vx.abs();
        assert!((infantry / cavalry - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_coincident_troops_separate() {
        let mut world = setup(
            &[
                UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1),
                UnitSpec::new(UnitKind::Swordsman, Faction::Red, 1, 1),
            ],
            flat(),
        );
        run(&mut world);
        let roster = world.resource::<UnitRoster>();
        let a = roster.unit(UnitId(0)).troop(0).vx;
        let b = roster.unit(UnitId(1)).troop(0).vx;
        assert!(a < 0.0 && b > 0.0);
    }

    #[test]
    fn test_quiet_formation_costs_nothing() {
        let mut world = setup(
            &[UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 4, 4)],
            GameSettings::default(),
        );
        run(&mut world);
        let unit = world.resource::<UnitRoster>().unit(UnitId(0));
        assert!(unit.troops().iter().all(|t| t.vx == 0.0 && t.vy == 0.0));
    }

    #[test]
    fn test_border_mode_matches_flat_for_front_contact() {
        let specs = [
            UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 3, 3),
            UnitSpec::new(UnitKind::Swordsman, Faction::Red, 3, 3).at(0.6, 0.0, std::f32::consts::PI),
        ];
        let mut border = setup(&specs, GameSettings::default());
        let mut flat_world = setup(&specs, flat());
        run(&mut border);
        run(&mut flat_world);

        let front = |world: &World| {
            let unit = world.resource::<UnitRoster>().unit(UnitId(0));
            (0..3).map(|s| unit.slot_troop(s).vx).collect::<Vec<f32>>()
        };
        assert_eq!(front(&border), front(&flat_world));
        assert!(front(&border).iter().all(|&vx| vx < 0.0));
    }

    #[test]
    fn test_border_mode_reaches_idle_cavalry() {
        let settings = GameSettings {
            collision_only_in_combat: true,
            cavalry_collision: true,
            ..GameSettings::default()
        };
        let specs = [
            UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 1, 1),
            UnitSpec::new(UnitKind::Cavalry, Faction::Blue, 1, 1).at(0.8, 0.0, 0.0),
        ];
        let prepare = |settings: GameSettings| {
            let mut world = setup(&specs, settings);
            world.resource_scope(|world, mut hasher: Mut<TroopHasher>| {
                let mut roster = world.resource_mut::<UnitRoster>();
                roster.unit_mut(UnitId(0)).under_fire = 1;
                hasher.hash_objects(&mut roster, &settings);
            });
            world
        };
        let mut border = prepare(settings);
        let mut flat_world = prepare(GameSettings {
            border_inward_collision: false,
            ..settings
        });
        {
            let roster = border.resource::<UnitRoster>();
            assert!(roster.unit(UnitId(0)).active);
            assert!(!roster.unit(UnitId(1)).active);
            assert_eq!(border.resource::<TroopHasher>().active_troops().len(), 2);
        }
        run(&mut border);
        run(&mut flat_world);

        let pushes = |world: &World| {
            let roster = world.resource::<UnitRoster>();
            (roster.unit(UnitId(0)).troop(0).vx, roster.unit(UnitId(1)).troop(0).vx)
        };
        let (infantry, cavalry) = pushes(&border);
        assert_eq!(pushes(&border), pushes(&flat_world));
        assert!(infantry < 0.0);
        assert!(cavalry > 0.0);
    }
}
