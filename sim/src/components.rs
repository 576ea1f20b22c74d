//! Shared battlefield vocabulary: factions, states, unit kinds and their stats.
//!
//! These are plain data types. Behaviour lives on `Unit`, `Troop` and the
//! pipeline systems that read them.

use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY
// ============================================================================

/// Political side of a unit. Troops of different factions fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Faction {
    Blue,
    Red,
}

impl Default for Faction {
    fn default() -> Self {
        Self::Blue
    }
}

// ============================================================================
// STATE MACHINES
// ============================================================================

/// Per-troop finite state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TroopState {
    /// Standing at the formation slot.
    InPosition,
    /// Walking toward the formation slot.
    Moving,
    /// Ranged troop shooting at the unit's target.
    FireAtWill,
    /// Terminal.
    Dead,
}

impl Default for TroopState {
    fn default() -> Self {
        Self::InPosition
    }
}

/// Unit-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitState {
    /// Holding the goal pose.
    Standing,
    /// Anchor travelling toward the goal pose.
    Moving,
    /// Locked in melee with an opponent unit.
    Fighting,
}

impl Default for UnitState {
    fn default() -> Self {
        Self::Standing
    }
}

// ============================================================================
// KINDS & STATS
// ============================================================================

/// How a ranged weapon delivers damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponKind {
    /// Arcing arrow that lands near the aim point.
    Bow,
    /// Heavy stone with splash damage.
    Catapult,
    /// Instant shot along a line.
    Musket,
}

/// Stats for units that shoot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangedStats {
    pub weapon: WeaponKind,
    /// Max distance from the unit anchor to the target's anchor.
    pub range: f32,
    /// Ticks between shots.
    pub reload_delay: u32,
    /// Idle ticks before an in-position troop starts firing at will.
    pub boredom_limit: u32,
    pub damage: f32,
    /// World units per tick. Unused by hitscan weapons.
    pub projectile_speed: f32,
    /// Area damage radius on impact.
    pub splash_radius: Option<f32>,
    /// Max aim error in world units.
    pub scatter: f32,
}

/// Per-unit stats shared by all its troops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Troop diameter.
    pub troop_size: f32,
    /// Distance between neighbouring formation slots.
    pub spacing: f32,
    /// Desired walking speed (units per tick).
    pub speed: f32,
    pub acceleration: f32,
    /// Max troop rotation per tick (radians).
    pub rotation_speed: f32,
    /// Slow down gradually instead of stopping dead on arrival.
    pub decelerates: bool,
    pub hp: f32,
    /// Melee damage per blow.
    pub attack: f32,
    /// Ticks between melee blows.
    pub combat_delay: u32,
    /// Melee reach beyond the troop's own radius.
    pub combat_range: f32,
    /// Contact ticks tolerated before the unit is forced into melee.
    pub patience: u32,
    /// Upper bound of the random step-off delay after a move order.
    pub reaction_delay_max: u32,
    /// Distance from the slot beyond which a troop starts moving again.
    pub standing_threshold: f32,
    pub is_cavalry: bool,
    /// Number of front rows using the stance angle.
    pub stance_rows: usize,
    /// Facing offset for the front rows (radians).
    pub stance_angle: f32,
    /// Max positional jitter around the slot.
    pub jitter: f32,
    /// Pushed downhill by the terrain slope.
    pub rolls_on_slopes: bool,
    pub ranged: Option<RangedStats>,
}

impl UnitStats {
    /// Radius used for troop-troop collision.
    #[inline]
    pub fn collision_radius(&self) -> f32 {
        self.troop_size / 2.0
    }

    /// Center distance within which a troop can strike or touch an enemy.
    #[inline]
    pub fn reach(&self) -> f32 {
        self.troop_size / 2.0 + self.combat_range
    }
}

impl Default for UnitStats {
    fn default() -> Self {
        UnitKind::Swordsman.stats()
    }
}

/// Kind of unit, selecting default stats and formation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Phalanx,
    Swordsman,
    Skirmisher,
    Cavalry,
    Archer,
    Catapult,
    Musketeer,
}

impl UnitKind {
    /// Default stats for this kind.
    pub fn stats(&self) -> UnitStats {
        let infantry = UnitStats {
            troop_size: 1.0,
            spacing: 1.2,
            speed: 0.12,
            acceleration: 0.02,
            rotation_speed: 0.15,
            decelerates: false,
            hp: 100.0,
            attack: 15.0,
            combat_delay: 20,
            combat_range: 0.4,
            patience: 25,
            reaction_delay_max: 10,
            standing_threshold: 0.2,
            is_cavalry: false,
            stance_rows: 0,
            stance_angle: 0.0,
            jitter: 0.0,
            rolls_on_slopes: false,
            ranged: None,
        };

        match self {
            UnitKind::Swordsman => infantry,
            UnitKind::Phalanx => UnitStats {
                speed: 0.10,
                hp: 120.0,
                attack: 12.0,
                combat_delay: 25,
                combat_range: 1.0,
                patience: 40,
                stance_rows: 3,
                stance_angle: 0.35,
                ..infantry
            },
            UnitKind::Skirmisher => UnitStats {
                spacing: 1.8,
                speed: 0.14,
                hp: 80.0,
                attack: 8.0,
                patience: 15,
                jitter: 0.3,
                ..infantry
            },
            UnitKind::Cavalry => UnitStats {
                troop_size: 2.0,
                spacing: 2.4,
                speed: 0.3,
                acceleration: 0.03,
                rotation_speed: 0.1,
                decelerates: true,
                hp: 150.0,
                attack: 20.0,
                combat_delay: 30,
                combat_range: 0.5,
                patience: 10,
                reaction_delay_max: 5,
                standing_threshold: 0.4,
                is_cavalry: true,
                ..infantry
            },
            UnitKind::Archer => UnitStats {
                spacing: 1.4,
                speed: 0.11,
                hp: 70.0,
                attack: 5.0,
                combat_delay: 25,
                combat_range: 0.3,
                patience: 50,
                ranged: Some(RangedStats {
                    weapon: WeaponKind::Bow,
                    range: 40.0,
                    reload_delay: 80,
                    boredom_limit: 30,
                    damage: 30.0,
                    projectile_speed: 0.8,
                    splash_radius: None,
                    scatter: 1.5,
                }),
                ..infantry
            },
            UnitKind::Catapult => UnitStats {
                troop_size: 3.0,
                spacing: 5.0,
                speed: 0.04,
                acceleration: 0.005,
                rotation_speed: 0.03,
                hp: 200.0,
                attack: 0.0,
                combat_delay: 60,
                combat_range: 0.1,
                patience: 100,
                standing_threshold: 0.5,
                rolls_on_slopes: true,
                ranged: Some(RangedStats {
                    weapon: WeaponKind::Catapult,
                    range: 60.0,
                    reload_delay: 240,
                    boredom_limit: 20,
                    damage: 80.0,
                    projectile_speed: 0.6,
                    splash_radius: Some(2.0),
                    scatter: 3.0,
                }),
                ..infantry
            },
            UnitKind::Musketeer => UnitStats {
                spacing: 1.3,
                speed: 0.1,
                hp: 90.0,
                attack: 7.0,
                combat_delay: 25,
                combat_range: 0.3,
                patience: 40,
                ranged: Some(RangedStats {
                    weapon: WeaponKind::Musket,
                    range: 25.0,
                    reload_delay: 150,
                    boredom_limit: 10,
                    damage: 60.0,
                    projectile_speed: 0.0,
                    splash_radius: None,
                    scatter: 0.5,
                }),
                ..infantry
            },
        }
    }
}
