//! Projectiles in flight and their spatial hash.

use crate::components::{Faction, WeaponKind};
use crate::spatial::{cell_key, world_to_cell};
use crate::troop::TroopKey;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Distance before landing from which an arrow can hit a troop.
const ARROW_IMPACT_WINDOW: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    pub kind: WeaponKind,
    pub faction: Faction,
    pub shooter: TroopKey,
    pub x: f32,
    pub y: f32,
    /// Direction of travel.
    pub angle: f32,
    pub speed: f32,
    pub damage: f32,
    /// Ground distance left before landing.
    pub remaining: f32,
    pub splash_radius: Option<f32>,
    alive: bool,
}

impl Projectile {
    #[allow(clippy::too_many_arguments)]
    pub fn launch(
        kind: WeaponKind,
        faction: Faction,
        shooter: TroopKey,
        from: (f32, f32),
        to: (f32, f32),
        speed: f32,
        damage: f32,
        splash_radius: Option<f32>,
    ) -> Self {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        Self {
            kind,
            faction,
            shooter,
            x: from.0,
            y: from.1,
            angle: dy.atan2(dx),
            speed,
            damage,
            remaining: (dx * dx + dy * dy).sqrt(),
            splash_radius,
            alive: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    /// Low enough to hit troops this tick.
    pub fn is_impactful(&self) -> bool {
        if !self.alive {
            return false;
        }
        match self.kind {
            WeaponKind::Bow => self.remaining <= ARROW_IMPACT_WINDOW,
            WeaponKind::Catapult | WeaponKind::Musket => self.remaining <= 0.0,
        }
    }

    /// Fly one tick. A projectile already on the ground goes inert.
    pub fn advance(&mut self) {
        if !self.alive {
            return;
        }
        if self.remaining <= 0.0 {
            self.alive = false;
            return;
        }
        let step = self.speed.min(self.remaining);
        self.x += self.angle.cos() * step;
        self.y += self.angle.sin() * step;
        self.remaining -= step;
    }
}

/// Pool of projectiles bucketed by cell.
#[derive(Resource, Debug)]
pub struct ObjectHasher {
    pub cell_size: f32,
    objects: Vec<Projectile>,
    cells: HashMap<u64, Vec<usize>>,
}

impl Default for ObjectHasher {
    fn default() -> Self {
        Self::new(8.0)
    }
}

impl ObjectHasher {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            objects: Vec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn spawn(&mut self, projectile: Projectile) {
        self.objects.push(projectile);
    }

    pub fn objects(&self) -> &[Projectile] {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut [Projectile] {
        &mut self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Fly every projectile, drop the spent ones and rebuild the buckets.
    pub fn update(&mut self) {
        for p in &mut self.objects {
            p.advance();
        }
        self.objects.retain(|p| p.is_alive());
        self.hash_objects();
    }

    pub fn hash_objects(&mut self) {
        self.cells.clear();
        for (i, p) in self.objects.iter().enumerate() {
            let (cx, cy) = world_to_cell(p.x, p.y, self.cell_size);
            self.cells.entry(cell_key(cx, cy)).or_default().push(i);
        }
    }

    /// Projectiles in the 3x3 cells around `(x, y)` as of the last rehash.
    ///
    /// Nothing in the tick reads this; it serves renderers and AI through
    /// [`Battlefield::projectiles_near`](crate::Battlefield::projectiles_near).
    pub fn get_objects_near(&self, x: f32, y: f32) -> Vec<&Projectile> {
        let (cx, cy) = world_to_cell(x, y, self.cell_size);
        let mut out = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                let key = cell_key(cx.saturating_add(dx), cy.saturating_add(dy));
                if let Some(bucket) = self.cells.get(&key) {
                    out.extend(bucket.iter().map(|&i| &self.objects[i]));
                }
            }
        }
        out
    }
}
