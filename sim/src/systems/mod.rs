//! ECS systems for the battlefield tick.
//!
//! ## Object modifier pipeline
//!
//! `Battlefield::modify_objects` runs these in order, single threaded:
//!
//! 0. `hash_objects_system` - rebuild the troop hash (see `spatial`)
//! 1. `terrain_speed_system` - slope and ground speed factors
//! 2. `object_collision_system` - projectiles hit troops
//! 3. `troop_collision_system` - troops push each other apart
//! 4. `melee_combat_system` - adjacent enemies trade blows
//! 5. `unit_patience_system` - contact bookkeeping and melee locks
//!
//! ## Update
//!
//! `Battlefield::step` then runs `unit_update_system` (anchors, troop state
//! machines, firing) and `projectile_update_system`.

pub mod combat;
pub mod movement;
pub mod object_collision;
pub mod patience;
pub mod terrain_speed;
pub mod troop_collision;

pub use combat::melee_combat_system;
pub use movement::{projectile_update_system, unit_update_system};
pub use object_collision::{object_collision_system, resolve_hitscan};
pub use patience::unit_patience_system;
pub use terrain_speed::terrain_speed_system;
pub use troop_collision::{resolve_troop_collisions, troop_collision_system, CollisionCounts};

use crate::math::dist_sq;
use crate::roster::UnitRoster;
use crate::spatial::TroopEntry;
use crate::troop::{Troop, TroopKey};

/// Closest accepted candidate within `max_dist_sq` of `(x, y)`.
///
/// Distances are measured from current troop positions. Ties go to the lower
/// slot index, then the lower unit id.
pub(crate) fn nearest_troop<'a>(
    roster: &UnitRoster,
    candidates: impl IntoIterator<Item = &'a TroopEntry>,
    x: f32,
    y: f32,
    max_dist_sq: f32,
    accept: impl Fn(&Troop) -> bool,
) -> Option<TroopKey> {
    let mut best: Option<(f32, usize, TroopKey)> = None;
    for entry in candidates {
        let troop = roster.troop(entry.key);
        if !troop.is_alive() || !accept(troop) {
            continue;
        }
        let d2 = dist_sq(x, y, troop.x, troop.y);
        if d2 > max_dist_sq {
            continue;
        }
        let rank = (d2, troop.slot, entry.key);
        let better = match &best {
            None => true,
            Some((bd, bs, bk)) => d2
                .total_cmp(bd)
                .then(troop.slot.cmp(bs))
                .then(entry.key.unit.cmp(&bk.unit))
                .is_lt(),
        };
        if better {
            best = Some(rank);
        }
    }
    best.map(|(_, _, key)| key)
}
