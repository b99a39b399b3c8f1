//! Off-screen spawn positions.

use glam::Vec3;

use crate::resources::CameraTarget;
use crate::rng::EntityRng;

/// A side of the camera rectangle on the XZ plane. "Top" is +Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenSide {
    Top,
    Bottom,
    Left,
    Right,
}

impl ScreenSide {
    pub const ALL: [ScreenSide; 4] = [
        ScreenSide::Top,
        ScreenSide::Bottom,
        ScreenSide::Left,
        ScreenSide::Right,
    ];

    pub fn random(rng: &mut EntityRng) -> Self {
        Self::ALL[rng.range_i32(0, 4) as usize]
    }

    /// Outward unit normal of this side.
    pub fn normal(self) -> Vec3 {
        match self {
            ScreenSide::Top => Vec3::Z,
            ScreenSide::Bottom => Vec3::NEG_Z,
            ScreenSide::Left => Vec3::NEG_X,
            ScreenSide::Right => Vec3::X,
        }
    }
}

/// Random point in the band `[min, max]` beyond `side` of the camera.
///
/// The perpendicular offset from the camera center is the side's half-extent
/// plus `U(min, max)`; the coordinate along the side is uniform in
/// `±(half_extent_along + max)`.
pub fn spawn_position_on_side(
    camera: &CameraTarget,
    side: ScreenSide,
    min: f32,
    max: f32,
    rng: &mut EntityRng,
) -> Vec3 {
    let c = camera.center;
    let h = camera.half_extents;
    let out = rng.range_f32(min, max);
    match side {
        ScreenSide::Top | ScreenSide::Bottom => {
            let sign = if side == ScreenSide::Top { 1.0 } else { -1.0 };
            let x = rng.range_f32(-(h.x + max), h.x + max);
            Vec3::new(c.x + x, c.y, c.z + sign * (h.z + out))
        }
        ScreenSide::Left | ScreenSide::Right => {
            let sign = if side == ScreenSide::Right { 1.0 } else { -1.0 };
            let z = rng.range_f32(-(h.z + max), h.z + max);
            Vec3::new(c.x + sign * (h.x + out), c.y, c.z + z)
        }
    }
}

/// [`spawn_position_on_side`] on a uniformly chosen side.
pub fn random_spawn_position(camera: &CameraTarget, min: f32, max: f32, rng: &mut EntityRng) -> Vec3 {
    let side = ScreenSide::random(rng);
    spawn_position_on_side(camera, side, min, max, rng)
}
