//! Stage 4: melee combat between adjacent enemy troops.
//!
//! Split into two phases:
//!
//! 1. **Gather** - every ready troop picks the nearest enemy within its
//!    reach. Read-only, so it runs on rayon with `--features parallel`.
//! 2. **Apply** - blows land in hashed-troop order. A troop killed earlier
//!    in the apply phase does not strike, and a blow at a troop already
//!    dead is not spent.

use crate::roster::{DeadTroops, SimTick, UnitRoster};
use crate::spatial::TroopHasher;
use crate::systems::nearest_troop;
use crate::troop::TroopKey;
use bevy_ecs::prelude::*;
use tracing::trace;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A blow chosen in the gather phase.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Blow {
    attacker: TroopKey,
    victim: TroopKey,
    damage: f32,
    delay: u32,
}

fn choose_blow(roster: &UnitRoster, hasher: &TroopHasher, key: TroopKey) -> Option<Blow> {
    let troop = roster.troop(key);
    if !troop.is_alive() || troop.combat_delay > 0 {
        return None;
    }
    let stats = roster.unit(key.unit).stats;
    let reach = stats.reach();
    let faction = troop.faction;
    let candidates = hasher.get_collision_objects_for(key, troop.x, troop.y);
    let victim = nearest_troop(roster, &candidates, troop.x, troop.y, reach * reach, |t| {
        t.faction != faction
    })?;
    Some(Blow {
        attacker: key,
        victim,
        damage: stats.attack,
        delay: stats.combat_delay,
    })
}

#[cfg(not(feature = "parallel"))]
fn gather_blows(roster: &UnitRoster, hasher: &TroopHasher) -> Vec<Blow> {
    hasher
        .active_troops()
        .iter()
        .filter_map(|&key| choose_blow(roster, hasher, key))
        .collect()
}

#[cfg(feature = "parallel")]
fn gather_blows(roster: &UnitRoster, hasher: &TroopHasher) -> Vec<Blow> {
    hasher
        .active_troops()
        .par_iter()
        .filter_map(|&key| choose_blow(roster, hasher, key))
        .collect()
}

/// Tick down combat delays and land melee blows.
pub fn melee_combat_system(
    tick: Res<SimTick>,
    hasher: Res<TroopHasher>,
    mut roster: ResMut<UnitRoster>,
    mut corpses: ResMut<DeadTroops>,
) {
    let blows = gather_blows(&roster, &hasher);

    for &key in hasher.active_troops() {
        let troop = roster.troop_mut(key);
        if troop.is_alive() && troop.combat_delay > 0 {
            troop.combat_delay -= 1;
        }
    }

    let mut kills = 0;
    for blow in blows {
        if !roster.troop(blow.attacker).is_alive() || !roster.troop(blow.victim).is_alive() {
            continue;
        }
        if roster.damage_troop(blow.victim, blow.damage, tick.0, &mut corpses) {
            kills += 1;
        }
        roster.troop_mut(blow.attacker).combat_delay = blow.delay;
    }
    if kills > 0 {
        trace!(kills, tick = tick.0, "Melee casualties");
    }
}
