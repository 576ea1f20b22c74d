//! Angle helpers and oriented bounding boxes.
//!
//! Box overlap uses the Separating Axis Theorem: two convex polygons are
//! disjoint iff their projections onto some edge normal are disjoint.

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Position plus facing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, angle: f32) -> Self {
        Self { x, y, angle }
    }

    /// Unit vector the pose faces.
    pub fn forward(&self) -> (f32, f32) {
        (self.angle.cos(), self.angle.sin())
    }

    /// Unit vector to the left of the facing.
    pub fn side(&self) -> (f32, f32) {
        (-self.angle.sin(), self.angle.cos())
    }

    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        dist_sq(self.x, self.y, x, y).sqrt()
    }
}

#[inline]
pub fn dist_sq(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    dx * dx + dy * dy
}

/// Wrap an angle into `(-PI, PI]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// Signed shortest rotation from `from` to `to`.
pub fn angle_diff(to: f32, from: f32) -> f32 {
    normalize_angle(to - from)
}

/// Rotate `current` toward `target` by at most `max_step`.
pub fn rotate_toward(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = angle_diff(target, current);
    if diff.abs() <= max_step {
        normalize_angle(target)
    } else {
        normalize_angle(current + max_step.copysign(diff))
    }
}

/// Rotate a vector by `angle`.
#[inline]
pub fn rotate(x: f32, y: f32, angle: f32) -> (f32, f32) {
    let (s, c) = angle.sin_cos();
    (x * c - y * s, x * s + y * c)
}

pub type Corners = [(f32, f32); 4];

/// Oriented rectangle stored as its four corners in winding order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Obb {
    pub corners: Corners,
}

impl Obb {
    /// Build a box in the frame of `pose` spanning `[min_f, max_f]` along the
    /// forward axis and `[min_s, max_s]` along the side axis.
    pub fn from_extents(pose: &Pose, min_f: f32, max_f: f32, min_s: f32, max_s: f32) -> Self {
        let (fx, fy) = pose.forward();
        let (sx, sy) = pose.side();
        let at = |f: f32, s: f32| (pose.x + f * fx + s * sx, pose.y + f * fy + s * sy);
        Self {
            corners: [
                at(min_f, min_s),
                at(max_f, min_s),
                at(max_f, max_s),
                at(min_f, max_s),
            ],
        }
    }

    /// True if the boxes overlap or touch.
    pub fn intersects(&self, other: &Obb) -> bool {
        for corners in [&self.corners, &other.corners] {
            for i in 0..4 {
                let j = (i + 1) % 4;
                let ex = corners[j].0 - corners[i].0;
                let ey = corners[j].1 - corners[i].1;
                let (ax, ay) = (-ey, ex);
                if ax == 0.0 && ay == 0.0 {
                    continue;
                }
                let (min_a, max_a) = project(&self.corners, ax, ay);
                let (min_b, max_b) = project(&other.corners, ax, ay);
                if max_a < min_b || max_b < min_a {
                    return false;
                }
            }
        }
        true
    }
}

fn project(corners: &Corners, ax: f32, ay: f32) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &(cx, cy) in corners {
        let dot = cx * ax + cy * ay;
        lo = lo.min(dot);
        hi = hi.max(dot);
    }
    (lo, hi)
}
