//! Battlefield ground: heightmap and ground types.
//!
//! The pipeline only sees terrain through the [`Terrain`] trait: a slope
//! velocity at a point and a movement multiplier. [`TerrainGrid`] is the
//! grid-based implementation; [`FlatTerrain`] is level open ground.

use crate::error::{BattleError, Result};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Downhill acceleration per unit of slope.
const SLOPE_PULL: f32 = 0.02;

/// Source of per-position movement modifiers.
pub trait Terrain: Send + Sync {
    /// Velocity change imparted by the slope at `(x, y)`. Points downhill.
    fn delta_vel_from_pos(&self, x: f32, y: f32) -> (f32, f32);

    /// Ground speed multiplier at `(x, y)`.
    fn movement_multiplier(&self, _x: f32, _y: f32) -> f32 {
        1.0
    }
}

/// Shared terrain for ECS systems.
#[derive(Resource, Clone)]
pub struct TerrainResource(pub Arc<dyn Terrain>);

impl TerrainResource {
    pub fn new(terrain: impl Terrain + 'static) -> Self {
        Self(Arc::new(terrain))
    }
}

impl Default for TerrainResource {
    fn default() -> Self {
        Self::new(FlatTerrain)
    }
}

impl fmt::Debug for TerrainResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TerrainResource(..)")
    }
}

/// Level open ground everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatTerrain;

impl Terrain for FlatTerrain {
    fn delta_vel_from_pos(&self, _x: f32, _y: f32) -> (f32, f32) {
        (0.0, 0.0)
    }
}

/// Ground type of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroundType {
    #[default]
    Open,
    Rough,
    Mud,
    Water,
    Road,
    Forest,
}

impl GroundType {
    pub fn movement_multiplier(&self) -> f32 {
        match self {
            GroundType::Open => 1.0,
            GroundType::Rough => 0.7,
            GroundType::Mud => 0.4,
            GroundType::Water => 0.2,
            GroundType::Road => 1.3,
            GroundType::Forest => 0.6,
        }
    }
}

/// Grid heightmap centered on the world origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainGrid {
    pub width: usize,
    pub height: usize,
    /// Size of each cell in world units.
    pub cell_size: f32,
    /// World position of cell (0, 0).
    pub origin_x: f32,
    pub origin_y: f32,
    /// Row-major heights.
    pub heights: Vec<f32>,
    /// Row-major ground types.
    pub ground: Vec<GroundType>,
}

impl TerrainGrid {
    pub fn new(width: usize, height: usize, cell_size: f32) -> Self {
        Self {
            width,
            height,
            cell_size,
            origin_x: -(width as f32 * cell_size) / 2.0,
            origin_y: -(height as f32 * cell_size) / 2.0,
            heights: vec![0.0; width * height],
            ground: vec![GroundType::Open; width * height],
        }
    }

    /// Replace the heightmap. `heights` must hold one value per cell.
    pub fn with_heights(mut self, heights: Vec<f32>) -> Result<Self> {
        if heights.len() != self.width * self.height {
            return Err(BattleError::InvalidTerrain {
                expected: self.width * self.height,
                actual: heights.len(),
            });
        }
        self.heights = heights;
        Ok(self)
    }

    /// Rolling plain with a central road, a hill and two woods.
    pub fn new_with_features(width: usize, height: usize, cell_size: f32) -> Self {
        let mut grid = Self::new(width, height, cell_size);

        let mid_y = height / 2;
        for x in 0..width {
            grid.set_ground(x, mid_y, GroundType::Road);
        }
        grid.add_hill(3 * width / 4, height / 4, width.min(height) / 6, 6.0);
        grid.add_patch(width / 4, 3 * height / 4, 4, GroundType::Forest);
        grid.add_patch(width / 4, height / 4, 3, GroundType::Mud);
        grid
    }

    /// Raise a cone-shaped hill.
    pub fn add_hill(&mut self, cx: usize, cy: usize, radius: usize, peak: f32) {
        if radius == 0 {
            return;
        }
        for (x, y, dist) in self.disc(cx, cy, radius) {
            let falloff = 1.0 - dist / radius as f32;
            self.heights[y * self.width + x] += peak * falloff;
        }
    }

    pub fn add_patch(&mut self, cx: usize, cy: usize, radius: usize, ground: GroundType) {
        for (x, y, _) in self.disc(cx, cy, radius) {
            self.set_ground(x, y, ground);
        }
    }

    fn disc(&self, cx: usize, cy: usize, radius: usize) -> Vec<(usize, usize, f32)> {
        let mut cells = Vec::new();
        for y in cy.saturating_sub(radius)..=(cy + radius).min(self.height.saturating_sub(1)) {
            for x in cx.saturating_sub(radius)..=(cx + radius).min(self.width.saturating_sub(1)) {
                let dx = x as f32 - cx as f32;
                let dy = y as f32 - cy as f32;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist <= radius as f32 {
                    cells.push((x, y, dist));
                }
            }
        }
        cells
    }

    fn set_ground(&mut self, x: usize, y: usize, ground: GroundType) {
        if x < self.width && y < self.height {
            self.ground[y * self.width + x] = ground;
        }
    }

    /// Clamp a world position onto grid coordinates.
    pub fn world_to_grid(&self, world_x: f32, world_y: f32) -> (usize, usize) {
        let gx = ((world_x - self.origin_x) / self.cell_size).floor() as i32;
        let gy = ((world_y - self.origin_y) / self.cell_size).floor() as i32;
        (
            gx.clamp(0, self.width as i32 - 1) as usize,
            gy.clamp(0, self.height as i32 - 1) as usize,
        )
    }

    pub fn height_at(&self, world_x: f32, world_y: f32) -> f32 {
        let (gx, gy) = self.world_to_grid(world_x, world_y);
        self.heights[gy * self.width + gx]
    }

    pub fn ground_at(&self, world_x: f32, world_y: f32) -> GroundType {
        let (gx, gy) = self.world_to_grid(world_x, world_y);
        self.ground[gy * self.width + gx]
    }

    /// Height gradient by central differences over one cell.
    pub fn gradient(&self, world_x: f32, world_y: f32) -> (f32, f32) {
        let h = self.cell_size;
        let gx = (self.height_at(world_x + h, world_y) - self.height_at(world_x - h, world_y)) / (2.0 * h);
        let gy = (self.height_at(world_x, world_y + h) - self.height_at(world_x, world_y - h)) / (2.0 * h);
        (gx, gy)
    }

    /// World bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.origin_x,
            self.origin_y,
            self.origin_x + self.width as f32 * self.cell_size,
            self.origin_y + self.height as f32 * self.cell_size,
        )
    }
}

impl Terrain for TerrainGrid {
    fn delta_vel_from_pos(&self, x: f32, y: f32) -> (f32, f32) {
        let (gx, gy) = self.gradient(x, y);
        (-gx * SLOPE_PULL, -gy * SLOPE_PULL)
    }

    fn movement_multiplier(&self, x: f32, y: f32) -> f32 {
        self.ground_at(x, y).movement_multiplier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_to_grid_centered() {
        let grid = TerrainGrid::new(100, 100, 2.0);
        assert_eq!(grid.world_to_grid(0.0, 0.0), (50, 50));
        assert_eq!(grid.world_to_grid(-1000.0, 1000.0), (0, 99));
    }

    #[test]
    fn test_heights_must_match_grid() {
        let grid = TerrainGrid::new(4, 4, 1.0);
        assert!(matches!(
            grid.clone().with_heights(vec![0.0; 3]),
            Err(BattleError::InvalidTerrain { expected: 16, actual: 3 })
        ));
        assert!(grid.with_heights(vec![1.0; 16]).is_ok());
    }

    #[test]
    fn test_slope_pushes_downhill() {
        // Height rises with x: ramp.
        let heights = (0..10 * 10).map(|i| (i % 10) as f32).collect();
        let grid = TerrainGrid::new(10, 10, 1.0).with_heights(heights).unwrap();
        let (dvx, dvy) = grid.delta_vel_from_pos(0.0, 0.0);
        assert!(dvx < 0.0);
        assert_eq!(dvy, 0.0);
    }

    #[test]
    fn test_flat_terrain_is_neutral() {
        assert_eq!(FlatTerrain.delta_vel_from_pos(3.0, 4.0), (0.0, 0.0));
        assert_eq!(FlatTerrain.movement_multiplier(3.0, 4.0), 1.0);
    }

    #[test]
    fn test_features_slow_and_lift() {
        let grid = TerrainGrid::new_with_features(80, 80, 2.0);
        assert_eq!(grid.ground_at(0.0, 1.0), GroundType::Road);
        assert!(grid.movement_multiplier(0.0, 1.0) > 1.0);
        let (hx, hy) = ((3.0 * 80.0 / 4.0 + 0.5) * 2.0 - 80.0, (80.0 / 4.0 + 0.5) * 2.0 - 80.0);
        assert!(grid.height_at(hx, hy) > 5.0);
    }
}
