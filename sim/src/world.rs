//! Serializable view of the battlefield.
//!
//! A `BattleSnapshot` is a plain copy of what a renderer or replay log needs:
//! unit anchors and states, every troop's pose, projectiles in flight and
//! fallen troops.

use crate::components::{Faction, TroopState, UnitKind, UnitState};
use crate::math::Pose;
use crate::projectile::ObjectHasher;
use crate::roster::{Corpse, DeadTroops, UnitRoster};
use crate::troop::CarriedObject;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: u32,
    pub kind: UnitKind,
    pub faction: Faction,
    pub width: usize,
    pub depth: usize,
    pub anchor: Pose,
    pub state: UnitState,
    pub alive: usize,
    pub patience: u32,
    pub in_contact: bool,
    pub opponent: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroopSnapshot {
    pub unit: u32,
    pub slot: usize,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub hp: f32,
    pub state: TroopState,
    /// Only present when the troop carries something.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carried: Vec<CarriedObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub faction: Faction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BattleSnapshot {
    pub tick: u64,
    pub units: Vec<UnitSnapshot>,
    /// Alive troops only.
    pub troops: Vec<TroopSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub corpses: Vec<Corpse>,
}

impl BattleSnapshot {
    pub fn capture(tick: u64, roster: &UnitRoster, objects: &ObjectHasher, dead: &DeadTroops) -> Self {
        let mut units = Vec::with_capacity(roster.len());
        let mut troops = Vec::new();

        for unit in roster.units() {
            units.push(UnitSnapshot {
                id: unit.id.0,
                kind: unit.kind,
                faction: unit.faction,
                width: unit.width(),
                depth: unit.depth(),
                anchor: unit.anchor,
                state: unit.state,
                alive: unit.alive_count(),
                patience: unit.patience,
                in_contact: unit.in_contact_with_enemy,
                opponent: unit.opponent.map(|o| o.0),
            });
            troops.extend(unit.alive_troops().map(|t| TroopSnapshot {
                unit: unit.id.0,
                slot: t.slot,
                x: t.x,
                y: t.y,
                angle: t.angle,
                hp: t.hp,
                state: t.state,
                carried: t.carried.clone(),
            }));
        }

        let projectiles = objects
            .objects()
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| ProjectileSnapshot {
                x: p.x,
                y: p.y,
                angle: p.angle,
                faction: p.faction,
            })
            .collect();

        Self {
            tick,
            units,
            troops,
            projectiles,
            corpses: dead.corpses().to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Read back a snapshot written by [`to_json`](Self::to_json), e.g. from a replay log.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
