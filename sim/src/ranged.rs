//! Ranged targeting and weapons.
//!
//! A ranged unit owns a [`Ranged`] policy that decides which enemy troop the
//! next shot goes at. When a troop is ready to fire, the unit turns the pick
//! into a [`FireCommand`], and the weapon for that command decides how the
//! shot is delivered: a flying projectile or an instant line hit.

use crate::components::{Faction, RangedStats, WeaponKind};
use crate::math::dist_sq;
use crate::projectile::Projectile;
use crate::troop::TroopKey;
use crate::unit::{Unit, UnitId};
use std::fmt::Debug;

/// Target selection for a ranged unit.
pub trait Ranged: Debug + Send + Sync {
    fn set_target(&mut self, target: Option<UnitId>);
    fn target(&self) -> Option<UnitId>;
    /// Pick the enemy troop for the next shot, or `None` if the opponent
    /// has no troop left to shoot at.
    fn pick_next_target(&mut self, opponent: &Unit) -> Option<TroopKey>;
}

/// Spreads shots across the target by cycling through its troops.
#[derive(Debug, Default)]
pub struct Volley {
    target: Option<UnitId>,
    cursor: usize,
}

impl Ranged for Volley {
    fn set_target(&mut self, target: Option<UnitId>) {
        self.target = target;
        self.cursor = 0;
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn pick_next_target(&mut self, opponent: &Unit) -> Option<TroopKey> {
        let troops = opponent.troops();
        let n = troops.len();
        for step in 0..n {
            let i = (self.cursor + step) % n;
            if troops[i].is_alive() {
                self.cursor = (i + 1) % n;
                return Some(troops[i].key());
            }
        }
        None
    }
}

/// Aims every shot at the troop nearest the target's center.
#[derive(Debug, Default)]
pub struct Bombard {
    target: Option<UnitId>,
}

impl Ranged for Bombard {
    fn set_target(&mut self, target: Option<UnitId>) {
        self.target = target;
    }

    fn target(&self) -> Option<UnitId> {
        self.target
    }

    fn pick_next_target(&mut self, opponent: &Unit) -> Option<TroopKey> {
        let alive = opponent.alive_count();
        if alive == 0 {
            return None;
        }
        let (sx, sy) = opponent
            .alive_troops()
            .fold((0.0, 0.0), |(sx, sy), t| (sx + t.x, sy + t.y));
        let (cx, cy) = (sx / alive as f32, sy / alive as f32);
        opponent
            .alive_troops()
            .min_by(|a, b| {
                dist_sq(a.x, a.y, cx, cy)
                    .total_cmp(&dist_sq(b.x, b.y, cx, cy))
                    .then(a.slot.cmp(&b.slot))
            })
            .map(|t| t.key())
    }
}

/// Targeting policy matching a weapon.
pub fn targeting_for(weapon: WeaponKind) -> Box<dyn Ranged> {
    match weapon {
        WeaponKind::Catapult => Box::<Bombard>::default(),
        WeaponKind::Bow | WeaponKind::Musket => Box::<Volley>::default(),
    }
}

/// A shot a troop has decided to take this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireCommand {
    pub shooter: TroopKey,
    pub faction: Faction,
    pub x: f32,
    pub y: f32,
    pub aim_x: f32,
    pub aim_y: f32,
    pub target_unit: UnitId,
    pub stats: RangedStats,
}

/// Instant shot resolved along a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitscanShot {
    pub shooter: TroopKey,
    pub faction: Faction,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub damage: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Launch {
    Projectile(Projectile),
    Hitscan(HitscanShot),
}

/// Turns a fire command into something that can hit.
pub trait Weapon: Sync {
    fn launch(&self, shot: &FireCommand) -> Launch;
}

pub struct Bow;
pub struct Catapult;
pub struct Musket;

impl Weapon for Bow {
    fn launch(&self, shot: &FireCommand) -> Launch {
        Launch::Projectile(Projectile::launch(
            WeaponKind::Bow,
            shot.faction,
            shot.shooter,
            (shot.x, shot.y),
            (shot.aim_x, shot.aim_y),
            shot.stats.projectile_speed,
            shot.stats.damage,
            None,
        ))
    }
}

impl Weapon for Catapult {
    fn launch(&self, shot: &FireCommand) -> Launch {
        Launch::Projectile(Projectile::launch(
            WeaponKind::Catapult,
            shot.faction,
            shot.shooter,
            (shot.x, shot.y),
            (shot.aim_x, shot.aim_y),
            shot.stats.projectile_speed,
            shot.stats.damage,
            shot.stats.splash_radius,
        ))
    }
}

impl Weapon for Musket {
    /// The ball flies the full weapon range along the aim line.
    fn launch(&self, shot: &FireCommand) -> Launch {
        let dx = shot.aim_x - shot.x;
        let dy = shot.aim_y - shot.y;
        let len = (dx * dx + dy * dy).sqrt();
        let (x2, y2) = if len > f32::EPSILON {
            let reach = shot.stats.range.max(len);
            (shot.x + dx / len * reach, shot.y + dy / len * reach)
        } else {
            (shot.aim_x, shot.aim_y)
        };
        Launch::Hitscan(HitscanShot {
            shooter: shot.shooter,
            faction: shot.faction,
            x1: shot.x,
            y1: shot.y,
            x2,
            y2,
            damage: shot.stats.damage,
        })
    }
}

pub fn weapon(kind: WeaponKind) -> &'static dyn Weapon {
    match kind {
        WeaponKind::Bow => &Bow,
        WeaponKind::Catapult => &Catapult,
        WeaponKind::Musket => &Musket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::UnitKind;
    use crate::rng::SimRng;
    use crate::unit::UnitSpec;

    fn enemy(width: usize, depth: usize) -> Unit {
        let mut rng = SimRng::seed_from_u64(8);
        let spec = UnitSpec::new(UnitKind::Swordsman, Faction::Red, width, depth).at(30.0, 0.0, 0.0);
        Unit::new(UnitId(1), &spec, &mut rng.0).unwrap()
    }

    #[test]
    fn test_volley_cycles_and_skips_dead() {
        let mut target = enemy(3, 1);
        let mut volley = Volley::default();
        volley.set_target(Some(target.id));

        let first = volley.pick_next_target(&target).unwrap();
        let second = volley.pick_next_target(&target).unwrap();
        assert_ne!(first, second);

        target.damage_troop(2, f32::MAX);
        let picks: Vec<u32> = (0..4)
            .map(|_| volley.pick_next_target(&target).unwrap().index)
            .collect();
        assert!(picks.iter().all(|&i| i != 2));
    }

    #[test]
    fn test_volley_empty_unit() {
        let mut target = enemy(1, 1);
        target.damage_troop(0, f32::MAX);
        assert_eq!(Volley::default().pick_next_target(&target), None);
    }

    #[test]
    fn test_bombard_aims_at_center() {
        let target = enemy(3, 3);
        let pick = Bombard::default().pick_next_target(&target).unwrap();
        // Center slot of a 3x3 block.
        assert_eq!(target.troop(pick.index).slot, 4);
    }

    #[test]
    fn test_musket_extends_to_range() {
        let stats = UnitKind::Musketeer.stats().ranged.unwrap();
        let shot = FireCommand {
            shooter: TroopKey { unit: UnitId(0), index: 0 },
            faction: Faction::Blue,
            x: 0.0,
            y: 0.0,
            aim_x: 5.0,
            aim_y: 0.0,
            target_unit: UnitId(1),
            stats,
        };
        match weapon(WeaponKind::Musket).launch(&shot) {
            Launch::Hitscan(line) => {
                assert!((line.x2 - stats.range).abs() < 1e-4);
                assert!(line.y2.abs() < 1e-6);
            }
            other => panic!("expected hitscan, got {other:?}"),
        }
    }

    #[test]
    fn test_targeting_matches_weapon() {
        let mut bombard = targeting_for(WeaponKind::Catapult);
        bombard.set_target(Some(UnitId(4)));
        assert_eq!(bombard.target(), Some(UnitId(4)));
        assert!(format!("{bombard:?}").contains("Bombard"));
    }
}
