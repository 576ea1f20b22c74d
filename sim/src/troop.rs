//! Individual combatants and their finite state machine.

use crate::components::{Faction, TroopState, UnitStats, WeaponKind};
use crate::math::{dist_sq, normalize_angle, rotate, rotate_toward, Pose};
use crate::unit::UnitId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Stable address of a troop: owning unit plus index into its troop arena.
///
/// The index never changes, unlike the formation slot which casualty reflow
/// reassigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TroopKey {
    pub unit: UnitId,
    pub index: u32,
}

/// A spent projectile stuck to a troop, stored in the troop's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarriedObject {
    pub kind: WeaponKind,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Angle relative to the troop's facing.
    pub angle: f32,
    /// Remaining lifetime in ticks.
    pub ttl: u32,
}

/// What the unit should do on behalf of a troop after its update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TroopAction {
    Idle,
    /// Reloaded and waiting for the unit to pick a target.
    ReadyToFire,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Troop {
    pub unit: UnitId,
    pub index: u32,
    /// Current formation slot, `row * width + col`.
    pub slot: usize,
    pub faction: Faction,
    pub x: f32,
    pub y: f32,
    /// External velocity collected during the tick pipeline.
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
    pub speed: f32,
    pub desired_speed: f32,
    /// Terrain multiplier on `desired_speed`, refreshed every tick.
    pub terrain_factor: f32,
    pub hp: f32,
    pub combat_delay: u32,
    pub state: TroopState,
    /// Slot pose the troop walks to.
    pub goal: Pose,
    pub reaction_delay: u32,
    pub boredom: u32,
    pub reload: u32,
    /// Fixed offset from the slot position (skirmish spread).
    pub jitter: (f32, f32),
    pub carried: Vec<CarriedObject>,
}

impl Troop {
    pub fn new(
        unit: UnitId,
        index: u32,
        faction: Faction,
        stats: &UnitStats,
        pose: Pose,
        rng: &mut impl Rng,
    ) -> Self {
        let jitter = if stats.jitter > 0.0 {
            (
                rng.gen_range(-stats.jitter..=stats.jitter),
                rng.gen_range(-stats.jitter..=stats.jitter),
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            unit,
            index,
            slot: index as usize,
            faction,
            x: pose.x,
            y: pose.y,
            vx: 0.0,
            vy: 0.0,
            angle: pose.angle,
            speed: 0.0,
            desired_speed: stats.speed,
            terrain_factor: 1.0,
            hp: stats.hp,
            combat_delay: 0,
            state: TroopState::InPosition,
            goal: pose,
            reaction_delay: 0,
            boredom: 0,
            reload: 0,
            jitter,
            carried: Vec::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> TroopKey {
        TroopKey {
            unit: self.unit,
            index: self.index,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.state != TroopState::Dead
    }

    /// Apply damage. Returns true only on the call that kills the troop;
    /// damage to a dead troop is ignored.
    pub fn receive_damage(&mut self, damage: f32) -> bool {
        if self.state == TroopState::Dead {
            return false;
        }
        self.hp -= damage;
        if self.hp <= 0.0 {
            self.state = TroopState::Dead;
            self.speed = 0.0;
            self.vx = 0.0;
            self.vy = 0.0;
            return true;
        }
        false
    }

    pub fn apply_impulse(&mut self, ix: f32, iy: f32) {
        self.vx += ix;
        self.vy += iy;
    }

    /// Velocity the troop would travel with this tick.
    pub fn pushed_velocity(&self) -> (f32, f32) {
        (
            self.angle.cos() * self.speed + self.vx,
            self.angle.sin() * self.speed + self.vy,
        )
    }

    /// Attach a spent projectile that hit at `(px, py)` travelling along `angle`.
    pub fn absorb(&mut self, kind: WeaponKind, px: f32, py: f32, angle: f32, ttl: u32) {
        let (offset_x, offset_y) = rotate(px - self.x, py - self.y, -self.angle);
        self.carried.push(CarriedObject {
            kind,
            offset_x,
            offset_y,
            angle: normalize_angle(angle - self.angle),
            ttl,
        });
    }

    pub fn distance_to_goal(&self) -> f32 {
        dist_sq(self.x, self.y, self.goal.x, self.goal.y).sqrt()
    }

    /// Advance the troop by one tick.
    ///
    /// `can_fire` tells ranged troops whether their unit has a live target in
    /// range. External velocity is integrated and cleared at the end.
    pub fn update(&mut self, stats: &UnitStats, can_fire: bool, rng: &mut impl Rng) -> TroopAction {
        if self.state == TroopState::Dead {
            return TroopAction::Idle;
        }

        self.carried.retain_mut(|c| {
            c.ttl = c.ttl.saturating_sub(1);
            c.ttl > 0
        });

        let action = if self.reaction_delay > 0 {
            self.reaction_delay -= 1;
            self.stand(stats);
            TroopAction::Idle
        } else {
            self.step_state(stats, can_fire, rng)
        };

        self.x += self.vx;
        self.y += self.vy;
        self.vx = 0.0;
        self.vy = 0.0;

        action
    }

    fn step_state(&mut self, stats: &UnitStats, can_fire: bool, rng: &mut impl Rng) -> TroopAction {
        let dist = self.distance_to_goal();
        match self.state {
            TroopState::InPosition => {
                if dist > stats.standing_threshold {
                    self.state = TroopState::Moving;
                    self.boredom = 0;
                    self.walk(stats, dist);
                    return TroopAction::Idle;
                }
                self.stand(stats);
                self.boredom = self.boredom.saturating_add(1);
                if let Some(ranged) = stats.ranged {
                    if can_fire && self.boredom >= ranged.boredom_limit {
                        self.state = TroopState::FireAtWill;
                        self.reload = rng.gen_range(0..=ranged.reload_delay);
                    }
                }
                TroopAction::Idle
            }
            TroopState::Moving => {
                self.walk(stats, dist);
                TroopAction::Idle
            }
            TroopState::FireAtWill => {
                if dist > stats.standing_threshold {
                    self.state = TroopState::Moving;
                    self.boredom = 0;
                    self.walk(stats, dist);
                    return TroopAction::Idle;
                }
                if !can_fire || stats.ranged.is_none() {
                    self.state = TroopState::InPosition;
                    self.boredom = 0;
                    self.stand(stats);
                    return TroopAction::Idle;
                }
                self.stand(stats);
                self.reload = self.reload.saturating_sub(1);
                if self.reload == 0 {
                    TroopAction::ReadyToFire
                } else {
                    TroopAction::Idle
                }
            }
            TroopState::Dead => TroopAction::Idle,
        }
    }

    fn walk(&mut self, stats: &UnitStats, dist: f32) {
        let dx = self.goal.x - self.x;
        let dy = self.goal.y - self.y;
        self.angle = rotate_toward(self.angle, dy.atan2(dx), stats.rotation_speed);

        let top_speed = self.desired_speed * self.terrain_factor;
        self.speed = (self.speed + stats.acceleration).min(top_speed);

        if dist <= self.speed {
            self.x = self.goal.x;
            self.y = self.goal.y;
            self.state = TroopState::InPosition;
            self.boredom = 0;
            if !stats.decelerates {
                self.speed = 0.0;
            }
        } else if dist > 0.0 {
            self.x += dx / dist * self.speed;
            self.y += dy / dist * self.speed;
        }
    }

    fn stand(&mut self, stats: &UnitStats) {
        self.angle = rotate_toward(self.angle, self.goal.angle, stats.rotation_speed);
        if stats.decelerates {
            self.speed *= 0.8;
            if self.speed < 1e-3 {
                self.speed = 0.0;
            }
        } else {
            self.speed = 0.0;
        }
    }
}
