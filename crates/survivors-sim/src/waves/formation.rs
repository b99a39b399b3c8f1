//! Scripted spawn formations.
//!
//! Each formation turns a camera rectangle and an enemy count into a list of
//! spawn positions plus the motion each enemy starts with.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::resources::CameraTarget;
use crate::rng::EntityRng;

use super::position::ScreenSide;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpawnFormation {
    /// A rectangular block entering from a random side and crossing the
    /// screen. `rows * columns` enemies; the event count is ignored.
    GridGroup { rows: u32, columns: u32, spacing: f32 },
    /// An ellipse circumscribing the camera rectangle, closing in on the
    /// player.
    EllipseAroundCamera { margin: f32 },
    /// A vertical line entering from the left or right, weaving as it goes.
    SineWaveVertical { amplitude: f32, frequency: f32 },
    /// A horizontal line entering from the top or bottom.
    SineWaveHorizontal { amplitude: f32, frequency: f32 },
    /// Any formation name this build does not know.
    #[serde(other)]
    Unknown,
}

/// Largest number of enemies one spawn event may place.
pub const MAX_FORMATION_SPAWNS: usize = 4096;

impl SpawnFormation {
    /// Number of enemies `formation_spawns` places for an event of `count`.
    pub fn spawn_count(&self, count: u32) -> usize {
        match *self {
            SpawnFormation::GridGroup { rows, columns, .. } => {
                (rows as usize).saturating_mul(columns as usize)
            }
            SpawnFormation::Unknown => 0,
            _ => count as usize,
        }
    }
}

/// How a formation enemy moves after spawning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormationMotion {
    ChasePlayer,
    Linear { direction: Vec3 },
    Sine {
        direction: Vec3,
        amplitude: f32,
        frequency: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationSpawn {
    pub position: Vec3,
    pub motion: FormationMotion,
}

/// Distance beyond the camera edge at which moving formations start.
const ENTRY_MARGIN: f32 = 2.0;

/// Positions for `formation`. `None` for [`SpawnFormation::Unknown`].
pub fn formation_spawns(
    formation: &SpawnFormation,
    camera: &CameraTarget,
    count: u32,
    rng: &mut EntityRng,
) -> Option<Vec<FormationSpawn>> {
    let c = camera.center;
    let h = camera.half_extents;
    let spawns = match *formation {
        SpawnFormation::GridGroup {
            rows,
            columns,
            spacing,
        } => {
            let side = ScreenSide::random(rng);
            let inward = -side.normal();
            let across = Vec3::new(-inward.z, 0.0, inward.x);
            let reach = match side {
                ScreenSide::Top | ScreenSide::Bottom => h.z,
                ScreenSide::Left | ScreenSide::Right => h.x,
            };
            let lateral = match side {
                ScreenSide::Top | ScreenSide::Bottom => h.x,
                ScreenSide::Left | ScreenSide::Right => h.z,
            };
            let anchor = c + side.normal() * (reach + ENTRY_MARGIN) + across * rng.range_f32(-lateral, lateral) * 0.5;
            let half_width = (columns.saturating_sub(1)) as f32 * spacing * 0.5;
            let mut out = Vec::with_capacity(formation.spawn_count(count).min(MAX_FORMATION_SPAWNS));
            for r in 0..rows {
                for col in 0..columns {
                    let back = side.normal() * (r as f32 * spacing);
                    let side_offset = across * (col as f32 * spacing - half_width);
                    out.push(FormationSpawn {
                        position: anchor + back + side_offset,
                        motion: FormationMotion::Linear { direction: inward },
                    });
                }
            }
            out
        }
        SpawnFormation::EllipseAroundCamera { margin } => {
            let n = count;
            let rx = (h.x + margin) * std::f32::consts::SQRT_2;
            let rz = (h.z + margin) * std::f32::consts::SQRT_2;
            (0..n)
                .map(|i| {
                    let angle = std::f32::consts::TAU * i as f32 / n as f32;
                    FormationSpawn {
                        position: Vec3::new(c.x + rx * angle.cos(), c.y, c.z + rz * angle.sin()),
                        motion: FormationMotion::ChasePlayer,
                    }
                })
                .collect()
        }
        SpawnFormation::SineWaveVertical {
            amplitude,
            frequency,
        } => {
            let side = if rng.chance(50.0) {
                ScreenSide::Left
            } else {
                ScreenSide::Right
            };
            line(c, h.z, side, h.x + ENTRY_MARGIN + amplitude, count, amplitude, frequency)
        }
        SpawnFormation::SineWaveHorizontal {
            amplitude,
            frequency,
        } => {
            let side = if rng.chance(50.0) {
                ScreenSide::Top
            } else {
                ScreenSide::Bottom
            };
            line(c, h.x, side, h.z + ENTRY_MARGIN + amplitude, count, amplitude, frequency)
        }
        SpawnFormation::Unknown => return None,
    };
    Some(spawns)
}

/// `count` enemies evenly spread along `side`, `distance` from the center,
/// covering `±half_span` and heading across the screen.
fn line(
    center: Vec3,
    half_span: f32,
    side: ScreenSide,
    distance: f32,
    count: u32,
    amplitude: f32,
    frequency: f32,
) -> Vec<FormationSpawn> {
    let normal = side.normal();
    let along = Vec3::new(-normal.z, 0.0, normal.x);
    let n = count;
    (0..n)
        .map(|i| {
            let t = if n == 1 { 0.5 } else { i as f32 / (n - 1) as f32 };
            let offset = -half_span + 2.0 * half_span * t;
            FormationSpawn {
                position: center + normal * distance + along * offset,
                motion: FormationMotion::Sine {
                    direction: -normal,
                    amplitude,
                    frequency,
                },
            }
        })
        .collect()
}
