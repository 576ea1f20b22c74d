//! Rectangular formations of troops.
//!
//! A unit owns its troops in a stable arena (`troops`) and maps formation
//! slots onto them (`slots`, row-major, `slot = row * width + col`). Whether a
//! slot is alive is read from the troop it holds, so there is exactly one
//! source of truth for membership.
//!
//! ## Formation invariant
//!
//! Alive slots always form full rows packed toward the front, followed by at
//! most one partially filled row whose alive cells are contiguous. Casualty
//! reflow (`dead_morph`) and the U-turn (`u_turn_formation`) both preserve it.

use crate::components::{Faction, TroopState, UnitKind, UnitState, UnitStats};
use crate::config::SimConfig;
use crate::error::{BattleError, Result};
use crate::math::{angle_diff, normalize_angle, rotate_toward, Obb, Pose};
use crate::ranged::{targeting_for, FireCommand, Ranged};
use crate::troop::{Troop, TroopAction};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_8, PI};
use tracing::debug;

/// Index of a unit in the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// Everything needed to place a unit on the battlefield.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSpec {
    pub kind: UnitKind,
    pub faction: Faction,
    pub width: usize,
    pub depth: usize,
    /// Front-center anchor pose.
    pub pose: Pose,
    /// Overrides the kind's default stats.
    pub stats: Option<UnitStats>,
}

impl UnitSpec {
    pub fn new(kind: UnitKind, faction: Faction, width: usize, depth: usize) -> Self {
        Self {
            kind,
            faction,
            width,
            depth,
            pose: Pose::default(),
            stats: None,
        }
    }

    pub fn at(mut self, x: f32, y: f32, angle: f32) -> Self {
        self.pose = Pose::new(x, y, angle);
        self
    }

    pub fn with_stats(mut self, stats: UnitStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

#[derive(Debug)]
pub struct Unit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub faction: Faction,
    pub stats: UnitStats,
    width: usize,
    depth: usize,
    troops: Vec<Troop>,
    slots: Vec<u32>,
    alive_count: usize,
    /// Center of the front row.
    pub anchor: Pose,
    pub goal: Pose,
    pub state: UnitState,
    /// Contact ticks left before the unit is forced into melee.
    pub patience: u32,
    pub in_contact_with_enemy: bool,
    /// Ticks left during which the unit counts as under fire.
    pub under_fire: u32,
    /// Melee opponent while fighting.
    pub opponent: Option<UnitId>,
    /// Eligible for collision and combat processing this tick.
    pub active: bool,
    ranged: Option<Box<dyn Ranged>>,
    bounding_box: Obb,
}

impl Unit {
    pub fn new(id: UnitId, spec: &UnitSpec, rng: &mut impl Rng) -> Result<Self> {
        if spec.width == 0 || spec.depth == 0 {
            return Err(BattleError::EmptyFormation {
                width: spec.width,
                depth: spec.depth,
            });
        }
        let stats = spec.stats.unwrap_or_else(|| spec.kind.stats());
        let count = spec.width * spec.depth;
        let troops = (0..count)
            .map(|i| Troop::new(id, i as u32, spec.faction, &stats, spec.pose, rng))
            .collect();

        let mut unit = Self {
            id,
            kind: spec.kind,
            faction: spec.faction,
            stats,
            width: spec.width,
            depth: spec.depth,
            troops,
            slots: (0..count as u32).collect(),
            alive_count: count,
            anchor: spec.pose,
            goal: spec.pose,
            state: UnitState::Standing,
            patience: stats.patience,
            in_contact_with_enemy: false,
            under_fire: 0,
            opponent: None,
            active: true,
            ranged: stats.ranged.map(|r| targeting_for(r.weapon)),
            bounding_box: Obb::default(),
        };

        unit.update_goal_positions();
        for troop in &mut unit.troops {
            troop.x = troop.goal.x;
            troop.y = troop.goal.y;
            troop.angle = troop.goal.angle;
        }
        unit.refresh_bounding_box();
        Ok(unit)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    pub fn is_dead(&self) -> bool {
        self.alive_count == 0
    }

    pub fn troops(&self) -> &[Troop] {
        &self.troops
    }

    pub fn troop(&self, index: u32) -> &Troop {
        &self.troops[index as usize]
    }

    /// Mutable troop access. Damage must go through [`Unit::damage_troop`].
    pub fn troop_mut(&mut self, index: u32) -> &mut Troop {
        &mut self.troops[index as usize]
    }

    /// Troop currently holding `slot`.
    pub fn slot_troop(&self, slot: usize) -> &Troop {
        &self.troops[self.slots[slot] as usize]
    }

    pub fn slot_alive(&self, slot: usize) -> bool {
        self.slot_troop(slot).is_alive()
    }

    /// Alive flag for every slot.
    pub fn alive_slots(&self) -> Vec<bool> {
        (0..self.slots.len()).map(|s| self.slot_alive(s)).collect()
    }

    pub fn alive_troops(&self) -> impl Iterator<Item = &Troop> {
        self.troops.iter().filter(|t| t.is_alive())
    }

    #[inline]
    pub fn row_col(&self, slot: usize) -> (usize, usize) {
        (slot / self.width, slot % self.width)
    }

    pub fn bounding_box(&self) -> &Obb {
        &self.bounding_box
    }

    pub fn is_fighting(&self) -> bool {
        self.state == UnitState::Fighting
    }

    pub fn ranged_target(&self) -> Option<UnitId> {
        self.ranged.as_ref().and_then(|r| r.target())
    }

    /// Returns false when the unit has no ranged weapon.
    pub fn set_ranged_target(&mut self, target: Option<UnitId>) -> bool {
        match self.ranged.as_mut() {
            Some(ranged) => {
                ranged.set_target(target);
                true
            }
            None => false,
        }
    }

    /// True if the alive slots satisfy the formation invariant.
    pub fn formation_is_packed(&self) -> bool {
        let full_rows = self.alive_count / self.width;
        let remainder = self.alive_count % self.width;
        for row in 0..self.depth {
            let alive: Vec<usize> = (0..self.width)
                .filter(|&col| self.slot_alive(row * self.width + col))
                .collect();
            let expected = if row < full_rows {
                self.width
            } else if row == full_rows {
                remainder
            } else {
                0
            };
            if alive.len() != expected {
                return false;
            }
            if let (Some(first), Some(last)) = (alive.first(), alive.last()) {
                if last - first + 1 != alive.len() {
                    return false;
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Formation
    // ------------------------------------------------------------------

    /// Goal pose of a slot relative to the current anchor.
    pub fn slot_pose(&self, slot: usize) -> Pose {
        let (row, col) = self.row_col(slot);
        let (fx, fy) = self.anchor.forward();
        let (sx, sy) = self.anchor.side();
        let lateral = (col as f32 - (self.width - 1) as f32 / 2.0) * self.stats.spacing;
        let back = row as f32 * self.stats.spacing;
        let angle = if row < self.stats.stance_rows {
            normalize_angle(self.anchor.angle + self.stats.stance_angle)
        } else {
            self.anchor.angle
        };
        Pose::new(
            self.anchor.x + lateral * sx - back * fx,
            self.anchor.y + lateral * sy - back * fy,
            angle,
        )
    }

    /// Recompute every troop's goal from its slot and the anchor.
    pub fn update_goal_positions(&mut self) {
        for slot in 0..self.slots.len() {
            let mut pose = self.slot_pose(slot);
            let troop = &mut self.troops[self.slots[slot] as usize];
            pose.x += troop.jitter.0;
            pose.y += troop.jitter.1;
            troop.goal = pose;
        }
    }

    /// Order the unit to a new goal pose, keeping its formation.
    ///
    /// Resets patience and any melee lock. A goal behind the unit turns the
    /// formation around first. Every troop gets a random step-off delay.
    pub fn move_formation_kept_to(
        &mut self,
        goal_x: f32,
        goal_y: f32,
        goal_angle: f32,
        config: &SimConfig,
        rng: &mut impl Rng,
    ) {
        self.goal = Pose::new(goal_x, goal_y, goal_angle);
        self.patience = self.stats.patience;
        self.opponent = None;
        self.state = UnitState::Moving;

        let dx = goal_x - self.anchor.x;
        let dy = goal_y - self.anchor.y;
        if dx != 0.0 || dy != 0.0 {
            let bearing = dy.atan2(dx);
            if angle_diff(bearing, self.anchor.angle).abs() > config.u_turn_threshold {
                self.u_turn_formation();
            }
        }

        let max_delay = self.stats.reaction_delay_max;
        for troop in self.troops.iter_mut().filter(|t| t.is_alive()) {
            troop.reaction_delay = rng.gen_range(0..=max_delay);
        }
    }

    /// Turn the formation around in place.
    ///
    /// Each column is compacted toward the rear, then the slot order is
    /// reversed so the old rear becomes the new front. The anchor moves to the
    /// last occupied row and its angle flips by PI.
    pub fn u_turn_formation(&mut self) {
        if self.alive_count == 0 {
            return;
        }
        let last_row = (self.alive_count - 1) / self.width;

        for col in 0..self.width {
            let column: Vec<u32> = (0..self.depth)
                .map(|row| self.slots[row * self.width + col])
                .collect();
            let (alive, dead): (Vec<u32>, Vec<u32>) = column
                .into_iter()
                .partition(|&t| self.troops[t as usize].is_alive());
            for (row, t) in dead.into_iter().chain(alive).enumerate() {
                self.slots[row * self.width + col] = t;
            }
        }

        self.slots.reverse();
        for (slot, &t) in self.slots.iter().enumerate() {
            self.troops[t as usize].slot = slot;
        }

        let (fx, fy) = self.anchor.forward();
        let back = last_row as f32 * self.stats.spacing;
        self.anchor = Pose::new(
            self.anchor.x - fx * back,
            self.anchor.y - fy * back,
            normalize_angle(self.anchor.angle + PI),
        );
        self.update_goal_positions();
        debug!(unit = self.id.0, alive = self.alive_count, "Formation turned around");
    }

    /// Damage a troop, running casualty reflow if this kills it.
    /// Returns true only on the killing blow.
    pub fn damage_troop(&mut self, index: u32, damage: f32) -> bool {
        let killed = self.troops[index as usize].receive_damage(damage);
        if killed {
            self.alive_count -= 1;
            self.dead_morph(index);
        }
        killed
    }

    /// Refill the gap left by a dead troop so the formation invariant holds.
    ///
    /// Walks the gap backward while the slot behind is alive, then sideways
    /// toward the row edge on the gap's half, then pulls the outermost troop
    /// from the next row. A gap with no candidate stays empty.
    pub fn dead_morph(&mut self, dead_index: u32) {
        assert!(
            !self.troops[dead_index as usize].is_alive(),
            "dead_morph called for a living troop"
        );
        let w = self.width;
        let mut gap = self.troops[dead_index as usize].slot;

        loop {
            assert!(
                gap < self.slots.len(),
                "formation gap {gap} outside {}x{} unit {:?}",
                self.width,
                self.depth,
                self.id
            );
            let (row, col) = self.row_col(gap);

            let behind = gap + w;
            if row + 1 < self.depth && self.slot_alive(behind) {
                self.swap_slots(gap, behind);
                gap = behind;
                continue;
            }

            let left_half = 2 * col + 1 <= w;
            if left_half && col > 0 && self.slot_alive(gap - 1) {
                self.swap_slots(gap, gap - 1);
                gap -= 1;
                continue;
            }
            if !left_half && col + 1 < w && self.slot_alive(gap + 1) {
                self.swap_slots(gap, gap + 1);
                gap += 1;
                continue;
            }

            if row + 1 < self.depth {
                let next = (row + 1) * w;
                let pick = if left_half {
                    (0..w).find(|&c| self.slot_alive(next + c))
                } else {
                    (0..w).rev().find(|&c| self.slot_alive(next + c))
                };
                if let Some(c) = pick {
                    self.swap_slots(gap, next + c);
                }
            }
            break;
        }
        debug_assert!(self.formation_is_packed(), "reflow broke formation of {:?}", self.id);
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
        let (ta, tb) = (self.slots[a] as usize, self.slots[b] as usize);
        self.troops[ta].slot = a;
        self.troops[tb].slot = b;
    }

    /// Outline of the formation as a slot-indexed map.
    ///
    /// Marks the first row, then left and right columns scanned down together
    /// until either side hits a dead slot, then the last line reached and the
    /// partial line behind it.
    pub fn get_border_troops(&self) -> Vec<bool> {
        let w = self.width;
        let mut border = vec![false; self.slots.len()];
        if self.alive_count == 0 {
            return border;
        }

        for col in 0..w {
            if self.slot_alive(col) {
                border[col] = true;
            }
        }

        let mut reached = 1;
        while reached < self.depth {
            let left = reached * w;
            let right = left + w - 1;
            if !(self.slot_alive(left) && self.slot_alive(right)) {
                break;
            }
            border[left] = true;
            border[right] = true;
            reached += 1;
        }

        for row in [reached - 1, reached] {
            if row >= self.depth {
                continue;
            }
            for col in 0..w {
                let slot = row * w + col;
                if self.slot_alive(slot) {
                    border[slot] = true;
                }
            }
        }
        border
    }

    /// Refit the cached bounding box around the alive troops.
    pub fn refresh_bounding_box(&mut self) {
        let (fx, fy) = self.anchor.forward();
        let (sx, sy) = self.anchor.side();
        let pad = self.stats.troop_size / 2.0;
        let mut min_f = f32::INFINITY;
        let mut max_f = f32::NEG_INFINITY;
        let mut min_s = f32::INFINITY;
        let mut max_s = f32::NEG_INFINITY;
        for troop in self.troops.iter().filter(|t| t.is_alive()) {
            let dx = troop.x - self.anchor.x;
            let dy = troop.y - self.anchor.y;
            let f = dx * fx + dy * fy;
            let s = dx * sx + dy * sy;
            min_f = min_f.min(f);
            max_f = max_f.max(f);
            min_s = min_s.min(s);
            max_s = max_s.max(s);
        }
        if min_f > max_f {
            self.bounding_box = Obb::default();
            return;
        }
        self.bounding_box = Obb::from_extents(
            &self.anchor,
            min_f - pad,
            max_f + pad,
            min_s - pad,
            max_s + pad,
        );
    }

    // ------------------------------------------------------------------
    // Melee lock
    // ------------------------------------------------------------------

    pub fn lock_opponent(&mut self, opponent: UnitId) {
        self.state = UnitState::Fighting;
        self.opponent = Some(opponent);
    }

    /// Drop a melee lock whose opponent is gone.
    pub fn release_opponent(&mut self) {
        self.opponent = None;
        self.patience = self.stats.patience;
        self.state = UnitState::Standing;
        self.goal = self.anchor;
    }

    // ------------------------------------------------------------------
    // Per-tick update
    // ------------------------------------------------------------------

    /// Move the anchor, refresh slot goals and run every troop's FSM.
    ///
    /// `opponent` is the melee opponent's anchor if that unit is still alive.
    /// `target` is the ranged target unit. Returns the shots fired this tick.
    pub fn update(
        &mut self,
        opponent: Option<Pose>,
        target: Option<&Unit>,
        config: &SimConfig,
        rng: &mut impl Rng,
    ) -> Vec<FireCommand> {
        let mut shots = Vec::new();
        if self.is_dead() {
            return shots;
        }

        if self.state == UnitState::Fighting {
            match opponent {
                Some(pose) => {
                    let dx = pose.x - self.anchor.x;
                    let dy = pose.y - self.anchor.y;
                    let angle = if dx != 0.0 || dy != 0.0 {
                        dy.atan2(dx)
                    } else {
                        self.anchor.angle
                    };
                    self.goal = Pose::new(pose.x, pose.y, angle);
                }
                None => self.release_opponent(),
            }
        }

        self.advance_anchor(config);
        self.update_goal_positions();

        let can_fire = self.can_fire_at(target);
        let stats = self.stats;
        let reload_delay = stats.ranged.map(|r| r.reload_delay).unwrap_or(0);
        for index in 0..self.troops.len() {
            if !self.troops[index].is_alive() {
                continue;
            }
            if self.troops[index].update(&stats, can_fire, rng) != TroopAction::ReadyToFire {
                continue;
            }
            let shot = match target {
                Some(target) => self.aim(index, target, rng),
                None => None,
            };
            let troop = &mut self.troops[index];
            match shot {
                Some(shot) => {
                    troop.reload = reload_delay;
                    shots.push(shot);
                }
                None => {
                    troop.state = TroopState::InPosition;
                    troop.boredom = 0;
                }
            }
        }
        shots
    }

    fn advance_anchor(&mut self, config: &SimConfig) {
        let speed = self.stats.speed;
        let dx = self.goal.x - self.anchor.x;
        let dy = self.goal.y - self.anchor.y;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist > speed {
            let bearing = dy.atan2(dx);
            self.anchor.angle = rotate_toward(self.anchor.angle, bearing, config.unit_rotation_speed);
            if angle_diff(bearing, self.anchor.angle).abs() < FRAC_PI_8 {
                self.anchor.x += dx / dist * speed;
                self.anchor.y += dy / dist * speed;
            }
            if self.state == UnitState::Standing {
                self.state = UnitState::Moving;
            }
        } else {
            self.anchor.x = self.goal.x;
            self.anchor.y = self.goal.y;
            self.anchor.angle =
                rotate_toward(self.anchor.angle, self.goal.angle, config.unit_rotation_speed);
            if self.state == UnitState::Moving && self.anchor.angle == normalize_angle(self.goal.angle) {
                self.state = UnitState::Standing;
            }
        }
    }

    fn can_fire_at(&self, target: Option<&Unit>) -> bool {
        let (Some(ranged), Some(target)) = (self.stats.ranged, target) else {
            return false;
        };
        !self.is_fighting()
            && !target.is_dead()
            && target.faction != self.faction
            && self.anchor.distance_to(target.anchor.x, target.anchor.y) <= ranged.range
    }

    fn aim(&mut self, index: usize, target: &Unit, rng: &mut impl Rng) -> Option<FireCommand> {
        let stats = self.stats.ranged?;
        let victim = self.ranged.as_mut()?.pick_next_target(target)?;
        let victim = target.troop(victim.index);
        let shooter = &self.troops[index];
        let (ex, ey) = if stats.scatter > 0.0 {
            (
                rng.gen_range(-stats.scatter..=stats.scatter),
                rng.gen_range(-stats.scatter..=stats.scatter),
            )
        } else {
            (0.0, 0.0)
        };
        Some(FireCommand {
            shooter: shooter.key(),
            faction: self.faction,
            x: shooter.x,
            y: shooter.y,
            aim_x: victim.x + ex,
            aim_y: victim.y + ey,
            target_unit: target.id,
            stats,
        })
    }
}
