//! Troop spatial hash.
//!
//! Rebuilt from scratch at the start of every tick. Lookups cost O(k) in the
//! number of troops in nearby cells instead of O(n) over the battlefield.
//!
//! Only troops of *active* units are bucketed. A unit is active when it is
//! engaged, or when its bounding box touches an opposing unit's box, so idle
//! formations far from the enemy cost nothing.

use crate::components::{Faction, UnitState};
use crate::config::GameSettings;
use crate::roster::UnitRoster;
use crate::troop::TroopKey;
use crate::unit::UnitId;
use bevy_ecs::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Widest ring, in cells, a radius query scans.
const MAX_QUERY_RANGE: i32 = 256;

/// Most cells a line query walks.
const MAX_LINE_CELLS: usize = 4096;

/// Pack signed cell coordinates into one map key.
#[inline]
pub fn cell_key(cx: i32, cy: i32) -> u64 {
    ((cx as u32 as u64) << 32) | (cy as u32 as u64)
}

#[inline]
pub fn world_to_cell(x: f32, y: f32, cell_size: f32) -> (i32, i32) {
    ((x / cell_size).floor() as i32, (y / cell_size).floor() as i32)
}

/// Entry in a troop cell, positioned as of the last rehash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TroopEntry {
    pub key: TroopKey,
    pub x: f32,
    pub y: f32,
    pub faction: Faction,
}

#[derive(Resource, Debug)]
pub struct TroopHasher {
    /// Cell size in world units.
    pub cell_size: f32,
    cells: HashMap<u64, Vec<TroopEntry>>,
    /// Troops bucketed this tick, in roster then slot order.
    active_troops: Vec<TroopKey>,
    active_units: Vec<UnitId>,
}

impl Default for TroopHasher {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TroopHasher {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            active_troops: Vec::new(),
            active_units: Vec::new(),
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        world_to_cell(x, y, self.cell_size)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.active_troops.clear();
        self.active_units.clear();
    }

    pub fn insert(&mut self, entry: TroopEntry) {
        let (cx, cy) = self.world_to_cell(entry.x, entry.y);
        self.cells.entry(cell_key(cx, cy)).or_default().push(entry);
        self.active_troops.push(entry.key);
    }

    /// Rebuild the hash for this tick.
    ///
    /// Runs [`TroopHasher::filter_active_units`] first, then buckets every
    /// alive troop of an active unit. With cavalry collision on, cavalry
    /// troops are bucketed even when their unit is inactive.
    pub fn hash_objects(&mut self, roster: &mut UnitRoster, settings: &GameSettings) {
        let active_units = Self::filter_active_units(roster, settings);
        self.clear();

        for &id in roster.alive_units() {
            let unit = roster.unit(id);
            if !unit.active && !(settings.cavalry_collision && unit.stats.is_cavalry) {
                continue;
            }
            for slot in 0..unit.slot_count() {
                let troop = unit.slot_troop(slot);
                if !troop.is_alive() {
                    continue;
                }
                self.insert(TroopEntry {
                    key: troop.key(),
                    x: troop.x,
                    y: troop.y,
                    faction: troop.faction,
                });
            }
        }
        self.active_units = active_units;
        trace!(
            troops = self.active_troops.len(),
            units = self.active_units.len(),
            cells = self.cells.len(),
            "Troop hash rebuilt"
        );
    }

    /// Decide which units take part in collision this tick.
    ///
    /// Drops dead units from the roster, refreshes bounding boxes, then marks
    /// every pair of opposing units whose boxes intersect. Returns the active
    /// unit ids. Reads `under_fire` without changing it, so rebuilding twice
    /// gives the same result.
    pub fn filter_active_units(roster: &mut UnitRoster, settings: &GameSettings) -> Vec<UnitId> {
        roster.drop_dead_units();
        let ids = roster.alive_units().to_vec();

        for &id in &ids {
            let unit = roster.unit_mut(id);
            unit.refresh_bounding_box();
            let engaged = unit.under_fire > 0
                || unit.in_contact_with_enemy
                || unit.state == UnitState::Fighting;
            unit.active = !settings.collision_only_in_combat || engaged;
        }

        for (a, b) in bounding_box_contacts(roster, &ids) {
            roster.unit_mut(a).active = true;
            roster.unit_mut(b).active = true;
        }

        ids.into_iter().filter(|&id| roster.unit(id).active).collect()
    }

    pub fn active_troops(&self) -> &[TroopKey] {
        &self.active_troops
    }

    pub fn active_units(&self) -> &[UnitId] {
        &self.active_units
    }

    /// Troops in the 3x3 cells around `(x, y)`.
    pub fn get_collision_objects(&self, x: f32, y: f32) -> Vec<TroopEntry> {
        self.neighbourhood(x, y, 1)
    }

    /// Like [`get_collision_objects`](Self::get_collision_objects) but never
    /// returns `key` itself.
    pub fn get_collision_objects_for(&self, key: TroopKey, x: f32, y: f32) -> Vec<TroopEntry> {
        let mut out = self.neighbourhood(x, y, 1);
        out.retain(|e| e.key != key);
        out
    }

    /// Troops in every cell that could hold a point within `distance`.
    /// Candidates are not distance filtered.
    pub fn get_collision_objects_within(&self, x: f32, y: f32, distance: f32) -> Vec<TroopEntry> {
        if !distance.is_finite() {
            return self.neighbourhood(x, y, MAX_QUERY_RANGE);
        }
        let range = ((distance / self.cell_size).ceil() as i32).clamp(1, MAX_QUERY_RANGE);
        self.neighbourhood(x, y, range)
    }

    /// Troops near the segment from `(x1, y1)` to `(x2, y2)`.
    ///
    /// Walks the cells the segment crosses and returns the troops in each
    /// walked cell and its 8 neighbours, each troop at most once.
    pub fn get_collision_objects_from_line(
        &self,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    ) -> Vec<TroopEntry> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Vec::new();
        }
        let start = self.world_to_cell(x1, y1);
        let end = self.world_to_cell(x2, y2);

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (cx, cy) in line_cells(start, end) {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    let key = cell_key(cx.saturating_add(dx), cy.saturating_add(dy));
                    if !seen.insert(key) {
                        continue;
                    }
                    if let Some(entries) = self.cells.get(&key) {
                        out.extend_from_slice(entries);
                    }
                }
            }
        }
        out
    }

    fn neighbourhood(&self, x: f32, y: f32, range: i32) -> Vec<TroopEntry> {
        let (cx, cy) = self.world_to_cell(x, y);
        let mut out = Vec::new();
        for dx in -range..=range {
            for dy in -range..=range {
                let key = cell_key(cx.saturating_add(dx), cy.saturating_add(dy));
                if let Some(entries) = self.cells.get(&key) {
                    out.extend_from_slice(entries);
                }
            }
        }
        out
    }

    pub fn cell_count(&self, cell: (i32, i32)) -> usize {
        self.cells.get(&cell_key(cell.0, cell.1)).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.active_troops.len()
    }
}

/// Grid cells crossed by a segment, start and end included. Very long
/// segments are cut off after `MAX_LINE_CELLS` cells.
fn line_cells(start: (i32, i32), end: (i32, i32)) -> Vec<(i32, i32)> {
    let (mut x, mut y) = start;
    let (x2, y2) = end;

    if x == x2 {
        let step = if y2 >= y { 1 } else { -1 };
        let mut cells = vec![(x, y)];
        while y != y2 && cells.len() < MAX_LINE_CELLS {
            y += step;
            cells.push((x, y));
        }
        return cells;
    }

    // i64 so that cells at opposite ends of the i32 range cannot overflow.
    let dx = (i64::from(x2) - i64::from(x)).abs();
    let dy = -(i64::from(y2) - i64::from(y)).abs();
    let sx = if x < x2 { 1 } else { -1 };
    let sy = if y < y2 { 1 } else { -1 };
    let mut err = dx + dy;
    let mut cells = Vec::new();
    loop {
        cells.push((x, y));
        if (x == x2 && y == y2) || cells.len() >= MAX_LINE_CELLS {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    cells
}

/// Opposing unit pairs whose bounding boxes intersect.
#[cfg(not(feature = "parallel"))]
fn bounding_box_contacts(roster: &UnitRoster, ids: &[UnitId]) -> Vec<(UnitId, UnitId)> {
    let mut contacts = Vec::new();
    for (i, &a) in ids.iter().enumerate() {
        contacts.extend(contacts_of(roster, a, &ids[i + 1..]));
    }
    contacts
}

#[cfg(feature = "parallel")]
fn bounding_box_contacts(roster: &UnitRoster, ids: &[UnitId]) -> Vec<(UnitId, UnitId)> {
    use rayon::prelude::*;
    (0..ids.len())
        .into_par_iter()
        .flat_map_iter(|i| contacts_of(roster, ids[i], &ids[i + 1..]))
        .collect()
}

fn contacts_of<'a>(
    roster: &'a UnitRoster,
    a: UnitId,
    others: &'a [UnitId],
) -> impl Iterator<Item = (UnitId, UnitId)> + 'a {
    let unit = roster.unit(a);
    others.iter().filter_map(move |&b| {
        let other = roster.unit(b);
        (other.faction != unit.faction && unit.bounding_box().intersects(other.bounding_box()))
            .then_some((a, b))
    })
}

/// Stage 0: rebuild the troop hash.
pub fn hash_objects_system(
    settings: Res<GameSettings>,
    mut hasher: ResMut<TroopHasher>,
    mut roster: ResMut<UnitRoster>,
) {
    hasher.hash_objects(&mut roster, &settings);
}
