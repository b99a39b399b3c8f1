//! ECS hot-path benchmarks: query iteration over enableable components and
//! command buffer playback at horde scale.
//!
//! Run with: `cargo bench --bench ecs_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use survivors_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Position {
    x: f32,
    z: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Velocity {
    dx: f32,
    dz: f32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Dying;

survivors_ecs::component!(Position => "position", Velocity => "velocity", Dying => "dying");

fn setup(count: usize) -> (World, Vec<EntityId>) {
    let mut world = World::new();
    world.register::<Position>();
    world.register::<Velocity>();
    world.register::<Dying>();
    let entities = (0..count)
        .map(|i| {
            world
                .spawn_bundle(
                    ComponentBundle::new()
                        .with(Position { x: i as f32, z: 0.0 })
                        .with(Velocity { dx: 1.0, dz: 0.5 })
                        .with_disabled(Dying),
                )
                .unwrap()
        })
        .collect();
    (world, entities)
}

fn bench_integrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate_positions");
    for count in [1_000usize, 10_000] {
        let (world, entities) = setup(count);
        for e in entities.iter().step_by(10) {
            world.set_enabled::<Dying>(*e, true);
        }
        let query = Query::new().with::<Position>().with::<Velocity>().without::<Dying>();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let velocities = world.read::<Velocity>();
                let mut positions = world.write::<Position>();
                for e in query.iter(&world) {
                    if let (Some(v), Some(p)) = (velocities.get(e), positions.get_mut(e)) {
                        p.x += v.dx * 0.016;
                        p.z += v.dz * 0.016;
                    }
                }
                black_box(positions.len())
            });
        });
    }
    group.finish();
}

fn bench_command_playback(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_playback");
    for count in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || setup(count),
                |(mut world, entities)| {
                    let mut buf = CommandBuffer::new();
                    for e in &entities {
                        buf.set_enabled::<Dying>(*e, true, SystemId(0), CausalReason::rule("bench"));
                        buf.despawn(*e, SystemId(0), CausalReason::rule("bench"));
                    }
                    black_box(buf.apply(&mut world).len())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_integrate, bench_command_playback);
criterion_main!(benches);
