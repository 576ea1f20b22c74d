//! Battle state resources: the unit roster, fallen troops and the tick counter.
//!
//! Units and troops are not ECS entities. A formation's slot table, alive
//! count and troops are read and reflowed together every tick, so each unit
//! owns its troops in one `Vec` and the roster owns the units in another.
//! `UnitId` and `TroopKey` are plain indices into those vectors and stay
//! valid for the whole battle, which keeps iteration order deterministic.

use crate::components::{Faction, UnitKind};
use crate::error::{BattleError, Result};
use crate::troop::{Troop, TroopKey};
use crate::unit::{Unit, UnitId, UnitSpec};
use bevy_ecs::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Simulation tick counter.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// All units ever placed. Ids index straight into the arena and stay valid
/// after a unit is wiped out.
#[derive(Resource, Debug, Default)]
pub struct UnitRoster {
    units: Vec<Unit>,
    alive: Vec<UnitId>,
    dead: Vec<UnitId>,
}

impl UnitRoster {
    pub fn add(&mut self, spec: UnitSpec, rng: &mut impl Rng) -> Result<UnitId> {
        let id = UnitId(self.units.len() as u32);
        let unit = Unit::new(id, &spec, rng)?;
        info!(
            unit = id.0,
            kind = ?spec.kind,
            faction = ?spec.faction,
            troops = unit.alive_count(),
            "Unit deployed"
        );
        self.units.push(unit);
        self.alive.push(id);
        Ok(id)
    }

    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id.0 as usize)
    }

    pub fn try_unit(&self, id: UnitId) -> Result<&Unit> {
        self.get(id).ok_or(BattleError::UnknownUnit(id))
    }

    pub fn try_unit_mut(&mut self, id: UnitId) -> Result<&mut Unit> {
        self.get_mut(id).ok_or(BattleError::UnknownUnit(id))
    }

    /// Unit by an id handed out by this roster.
    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.0 as usize]
    }

    pub fn unit_mut(&mut self, id: UnitId) -> &mut Unit {
        &mut self.units[id.0 as usize]
    }

    pub fn troop(&self, key: TroopKey) -> &Troop {
        self.unit(key.unit).troop(key.index)
    }

    pub fn troop_mut(&mut self, key: TroopKey) -> &mut Troop {
        self.unit_mut(key.unit).troop_mut(key.index)
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn alive_units(&self) -> &[UnitId] {
        &self.alive
    }

    pub fn dead_units(&self) -> &[UnitId] {
        &self.dead
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Move wiped-out units from the alive list to the dead list.
    pub fn drop_dead_units(&mut self) -> usize {
        let before = self.dead.len();
        let units = &self.units;
        let dead = &mut self.dead;
        self.alive.retain(|&id| {
            let wiped = units[id.0 as usize].is_dead();
            if wiped {
                dead.push(id);
            }
            !wiped
        });
        let dropped = self.dead.len() - before;
        if dropped > 0 {
            debug!(dropped, remaining = self.alive.len(), "Dropped wiped-out units");
        }
        dropped
    }

    /// Damage a troop and record its corpse if the blow kills it.
    pub fn damage_troop(
        &mut self,
        key: TroopKey,
        damage: f32,
        tick: u64,
        corpses: &mut DeadTroops,
    ) -> bool {
        let unit = self.unit_mut(key.unit);
        let killed = unit.damage_troop(key.index, damage);
        if killed {
            let troop = unit.troop(key.index);
            corpses.push(Corpse {
                unit: key.unit,
                kind: unit.kind,
                faction: unit.faction,
                x: troop.x,
                y: troop.y,
                angle: troop.angle,
                tick,
            });
            if unit.is_dead() {
                info!(unit = key.unit.0, tick, "Unit wiped out");
            }
        }
        killed
    }

    /// Mutable access to one unit with shared access to another.
    ///
    /// `other` resolves to `None` when it is absent, unknown or equal to `id`.
    pub fn pair_mut(&mut self, id: UnitId, other: Option<UnitId>) -> (&mut Unit, Option<&Unit>) {
        let i = id.0 as usize;
        let j = other
            .map(|o| o.0 as usize)
            .filter(|&j| j != i && j < self.units.len());
        match j {
            None => (&mut self.units[i], None),
            Some(j) if j < i => {
                let (head, tail) = self.units.split_at_mut(i);
                (&mut tail[0], Some(&head[j]))
            }
            Some(j) => {
                let (head, tail) = self.units.split_at_mut(j);
                (&mut head[i], Some(&tail[0]))
            }
        }
    }
}

/// A fallen troop left on the field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corpse {
    pub unit: UnitId,
    pub kind: UnitKind,
    pub faction: Faction,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub tick: u64,
}

#[derive(Resource, Debug, Default)]
pub struct DeadTroops {
    corpses: Vec<Corpse>,
}

impl DeadTroops {
    pub fn push(&mut self, corpse: Corpse) {
        self.corpses.push(corpse);
    }

    pub fn corpses(&self) -> &[Corpse] {
        &self.corpses
    }

    pub fn len(&self) -> usize {
        self.corpses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimRng;

    fn roster() -> UnitRoster {
        let mut rng = SimRng::seed_from_u64(2);
        let mut roster = UnitRoster::default();
        roster
            .add(UnitSpec::new(UnitKind::Swordsman, Faction::Blue, 2, 1), &mut rng.0)
            .unwrap();
        roster
            .add(UnitSpec::new(UnitKind::Archer, Faction::Red, 2, 2).at(20.0, 0.0, 0.0), &mut rng.0)
            .unwrap();
        roster
    }

    #[test]
    fn test_kill_records_corpse_once() {
        let mut roster = roster();
        let mut corpses = DeadTroops::default();
        let key = TroopKey { unit: UnitId(0), index: 1 };
        assert!(roster.damage_troop(key, 500.0, 7, &mut corpses));
        assert!(!roster.damage_troop(key, 500.0, 8, &mut corpses));
        assert_eq!(corpses.len(), 1);
        assert_eq!(corpses.corpses()[0].tick, 7);
    }

    #[test]
    fn test_wiped_unit_moves_to_dead_list() {
        let mut roster = roster();
        let mut corpses = DeadTroops::default();
        for index in 0..2 {
            roster.damage_troop(TroopKey { unit: UnitId(0), index }, 500.0, 1, &mut corpses);
        }
        assert_eq!(roster.drop_dead_units(), 1);
        assert_eq!(roster.alive_units(), &[UnitId(1)]);
        assert_eq!(roster.dead_units(), &[UnitId(0)]);
        // The id still resolves.
        assert!(roster.unit(UnitId(0)).is_dead());
        assert_eq!(roster.drop_dead_units(), 0);
    }

    #[test]
    fn test_pair_mut_both_orders() {
        let mut roster = roster();
        let (a, b) = roster.pair_mut(UnitId(1), Some(UnitId(0)));
        assert_eq!(a.id, UnitId(1));
        assert_eq!(b.map(|u| u.id), Some(UnitId(0)));

        let (a, b) = roster.pair_mut(UnitId(0), Some(UnitId(1)));
        assert_eq!(a.id, UnitId(0));
        assert_eq!(b.map(|u| u.id), Some(UnitId(1)));

        let (_, b) = roster.pair_mut(UnitId(0), Some(UnitId(0)));
        assert!(b.is_none());
        let (_, b) = roster.pair_mut(UnitId(0), Some(UnitId(9)));
        assert!(b.is_none());
    }

    #[test]
    fn test_unknown_unit_is_an_error() {
        let roster = roster();
        assert!(matches!(
            roster.try_unit(UnitId(42)),
            Err(BattleError::UnknownUnit(UnitId(42)))
        ));
    }
}
