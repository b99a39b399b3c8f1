//! Movement evaluators and the systems that drive transforms.
//!
//! Scripted motion is stateless: each evaluator maps `t = elapsed -
//! start_time` to a position, so an entity's path depends only on its
//! [`MovementStart`] and the clock, never on accumulated per-tick steps.

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{
    direction_xz, distance_xz, ChasePlayer, DestroyEntityFlag, FollowOwner, LastMoveDirection,
    LocalTransform, Movement, MovementStart, MoveSpeed, Player,
};
use crate::resources::{find_player, Resources};
use crate::stats::{stats_of, StatKind};

/// Enemies closer than this to the player stop chasing.
const CHASE_STOP_DISTANCE: f32 = 0.05;

// ---------------------------------------------------------------------------
// Evaluators
// ---------------------------------------------------------------------------

pub fn linear(origin: Vec3, direction: Vec3, speed: f32, t: f32) -> Vec3 {
    origin + direction * speed * t
}

/// Linear travel plus a sideways sine offset on the XZ plane.
pub fn sine(origin: Vec3, direction: Vec3, speed: f32, amplitude: f32, frequency: f32, t: f32) -> Vec3 {
    let side = Vec3::new(-direction.z, 0.0, direction.x);
    let sway = amplitude * (std::f32::consts::TAU * frequency * t).sin();
    linear(origin, direction, speed, t) + side * sway
}

pub fn parabolic(origin: Vec3, velocity: Vec3, gravity: Vec3, t: f32) -> Vec3 {
    origin + velocity * t + gravity * (0.5 * t * t)
}

/// Out along `direction`, slowing by `deceleration`, then back past the
/// origin.
pub fn boomerang(origin: Vec3, direction: Vec3, speed: f32, deceleration: f32, t: f32) -> Vec3 {
    origin + direction * (speed * t - 0.5 * deceleration * t * t)
}

/// Position of `movement` at `t` seconds after `start.start_time`.
pub fn evaluate(movement: &Movement, origin: Vec3, t: f32) -> Vec3 {
    match *movement {
        Movement::Linear { direction, speed } => linear(origin, direction, speed, t),
        Movement::Sine {
            direction,
            speed,
            amplitude,
            frequency,
        } => sine(origin, direction, speed, amplitude, frequency, t),
        Movement::Parabolic { velocity, gravity } => parabolic(origin, velocity, gravity, t),
        Movement::Boomerang {
            direction,
            speed,
            deceleration,
        } => boomerang(origin, direction, speed, deceleration, t),
        Movement::Stationary => origin,
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

/// Evaluate scripted movement for every entity that has it.
pub fn apply_movement(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let elapsed = res.time.elapsed;
    let movements = world.read::<Movement>();
    let starts = world.read::<MovementStart>();
    let mut transforms = world.write::<LocalTransform>();
    for (entity, movement) in movements.iter() {
        let (Some(start), Some(transform)) = (starts.get(entity), transforms.get_mut(entity)) else {
            continue;
        };
        let t = (elapsed - start.start_time).max(0.0) as f32;
        let next = evaluate(movement, start.origin, t);
        if let Some(heading) = direction_xz(transform.position, next) {
            transform.heading = heading;
        }
        transform.position = next;
    }
}

/// Move chasing enemies straight toward the player.
pub fn chase_player(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let Some(player) = find_player(world) else {
        return;
    };
    let Some(target) = world.get::<LocalTransform>(player).map(|t| t.position) else {
        return;
    };
    let dt = res.time.dt;
    let chasers = Query::new()
        .with::<ChasePlayer>()
        .with_present::<LocalTransform>()
        .without::<DestroyEntityFlag>()
        .collect(world);
    let speeds = world.read::<ChasePlayer>();
    let mut transforms = world.write::<LocalTransform>();
    for enemy in chasers {
        let (Some(chase), Some(transform)) = (speeds.get(enemy), transforms.get_mut(enemy)) else {
            continue;
        };
        let distance = distance_xz(transform.position, target);
        if distance <= CHASE_STOP_DISTANCE {
            continue;
        }
        let Some(dir) = direction_xz(transform.position, target) else {
            continue;
        };
        let step = (chase.speed * dt).min(distance);
        transform.position += dir * step;
        transform.heading = dir;
    }
}

/// Snap followers onto their owners. A follower whose owner is gone is
/// flagged for destruction.
pub fn follow_owner(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
    let followers = world.read::<FollowOwner>();
    let mut transforms = world.write::<LocalTransform>();
    for (entity, FollowOwner(owner)) in followers.iter() {
        let owner_pos = world.is_alive(*owner).then(|| transforms.get(*owner).map(|t| t.position));
        match owner_pos.flatten() {
            Some(pos) => {
                if let Some(transform) = transforms.get_mut(entity) {
                    transform.position = pos;
                }
            }
            None => {
                world.set_enabled::<DestroyEntityFlag>(entity, true);
            }
        }
    }
}

/// Move the player by this tick's input.
pub fn move_player(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let Some(player) = find_player(world) else {
        return;
    };
    if world.is_enabled::<DestroyEntityFlag>(player) {
        return;
    }
    let input = Vec3::new(res.input.direction.x, 0.0, res.input.direction.z);
    let Some(dir) = input.try_normalize() else {
        return;
    };
    // Analog input below full tilt moves slower.
    let tilt = input.length().min(1.0);
    let base = world.get::<MoveSpeed>(player).map_or(0.0, |s| s.0);
    let speed = base * stats_of(world, player).get(StatKind::MoveSpeed);

    if let Some(transform) = world.write::<LocalTransform>().get_mut(player) {
        transform.position += dir * speed * tilt * res.time.dt;
        transform.heading = dir;
    }
    if let Some(last) = world.write::<LastMoveDirection>().get_mut(player) {
        last.0 = dir;
    }
}

/// Keep the camera centered on the player.
pub fn update_camera(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let Some(camera) = res.camera.as_mut() else {
        return;
    };
    let Some(player) = Query::new().with_present::<Player>().first(world) else {
        return;
    };
    if let Some(position) = world.get::<LocalTransform>(player).map(|t| t.position) {
        camera.center = Vec3::new(position.x, camera.center.y, position.z);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_all;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn evaluators_start_at_origin() {
        let o = Vec3::new(1.0, 0.0, 2.0);
        assert!(close(linear(o, Vec3::X, 3.0, 0.0), o));
        assert!(close(sine(o, Vec3::X, 3.0, 1.0, 2.0, 0.0), o));
        assert!(close(parabolic(o, Vec3::Z, Vec3::NEG_Z, 0.0), o));
        assert!(close(boomerang(o, Vec3::X, 4.0, 4.0, 0.0), o));
    }

    #[test]
    fn sine_sways_perpendicular_to_travel() {
        // Quarter period: full amplitude sideways.
        let p = sine(Vec3::ZERO, Vec3::X, 0.0, 2.0, 1.0, 0.25);
        assert!(close(p, Vec3::new(0.0, 0.0, 2.0)));
    }

    #[test]
    fn parabolic_arc_falls_back() {
        let v = Vec3::new(0.0, 0.0, 9.0);
        let g = Vec3::new(0.0, 0.0, -18.0);
        assert!(close(parabolic(Vec3::ZERO, v, g, 0.5), Vec3::new(0.0, 0.0, 2.25)));
        assert!(close(parabolic(Vec3::ZERO, v, g, 1.0), Vec3::ZERO));
    }

    #[test]
    fn boomerang_returns_at_turnaround_twice() {
        // speed 4, decel 4: peak at t=1 (distance 2), back at origin at t=2.
        assert!(close(boomerang(Vec3::ZERO, Vec3::X, 4.0, 4.0, 1.0), Vec3::new(2.0, 0.0, 0.0)));
        assert!(close(boomerang(Vec3::ZERO, Vec3::X, 4.0, 4.0, 2.0), Vec3::ZERO));
    }

    #[test]
    fn apply_movement_uses_time_since_start() {
        let mut world = World::new();
        register_all(&mut world);
        let e = world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(LocalTransform::at(Vec3::ZERO))
                    .with(Movement::Linear {
                        direction: Vec3::X,
                        speed: 2.0,
                    })
                    .with(MovementStart {
                        origin: Vec3::ZERO,
                        start_time: 1.0,
                    }),
            )
            .unwrap();
        let mut res = Resources::for_tests();
        res.time.elapsed = 3.0;
        apply_movement(&world, &mut res, &mut CommandBuffer::new());
        let t = world.get_cloned::<LocalTransform>(e).unwrap();
        assert!(close(t.position, Vec3::new(4.0, 0.0, 0.0)));
        assert_eq!(t.heading, Vec3::X);
    }

    #[test]
    fn chasers_close_distance_without_overshoot() {
        let mut world = World::new();
        register_all(&mut world);
        world
            .spawn_bundle(ComponentBundle::new().with(Player).with(LocalTransform::at(Vec3::ZERO)))
            .unwrap();
        let enemy = world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(ChasePlayer { speed: 60.0 })
                    .with(LocalTransform::at(Vec3::new(0.5, 0.0, 0.0)))
                    .with_disabled(DestroyEntityFlag),
            )
            .unwrap();
        let mut res = Resources::for_tests();
        chase_player(&world, &mut res, &mut CommandBuffer::new());
        let p = world.get_cloned::<LocalTransform>(enemy).unwrap().position;
        assert!(close(p, Vec3::ZERO));
    }

    #[test]
    fn player_moves_by_input_and_stat() {
        let mut world = World::new();
        register_all(&mut world);
        let player = world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Player)
                    .with(LocalTransform::at(Vec3::ZERO))
                    .with(MoveSpeed(6.0))
                    .with(LastMoveDirection(Vec3::X)),
            )
            .unwrap();
        let mut res = Resources::for_tests();
        res.input.direction = Vec3::new(0.0, 0.0, -1.0);
        move_player(&world, &mut res, &mut CommandBuffer::new());
        let t = world.get_cloned::<LocalTransform>(player).unwrap();
        assert!(close(t.position, Vec3::new(0.0, 0.0, -0.1)));
        assert_eq!(world.get_cloned::<LastMoveDirection>(player).unwrap().0, Vec3::NEG_Z);

        update_camera(&world, &mut res, &mut CommandBuffer::new());
        assert!(close(res.camera.unwrap().center, Vec3::new(0.0, 0.0, -0.1)));
    }

    #[test]
    fn followers_track_owner_and_die_with_it() {
        let mut world = World::new();
        register_all(&mut world);
        let owner = world.spawn_with(LocalTransform::at(Vec3::new(3.0, 0.0, 1.0)));
        let aura = world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(FollowOwner(owner))
                    .with(LocalTransform::at(Vec3::ZERO))
                    .with_disabled(DestroyEntityFlag),
            )
            .unwrap();
        let mut res = Resources::for_tests();
        follow_owner(&world, &mut res, &mut CommandBuffer::new());
        assert_eq!(world.get_cloned::<LocalTransform>(aura).unwrap().position, Vec3::new(3.0, 0.0, 1.0));

        world.despawn(owner).unwrap();
        follow_owner(&world, &mut res, &mut CommandBuffer::new());
        assert!(world.is_enabled::<DestroyEntityFlag>(aura));
    }
}
