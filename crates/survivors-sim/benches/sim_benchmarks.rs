//! Whole-tick benchmarks on a populated session.
//!
//! Run with: `cargo bench --bench sim_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use survivors_sim::prelude::*;

fn warmed_session(warmup: u64) -> Simulation {
    let mut sim = Simulation::new(GameConfig::default(), SimulationOptions::default()).unwrap();
    for t in 0..warmup {
        let angle = t as f32 * 0.01;
        sim.set_input(Vec3::new(angle.cos(), 0.0, angle.sin()));
        sim.tick();
        while sim.pending_level_up().is_some() {
            if sim.choose_upgrade(0).is_err() {
                sim.skip_level_up();
            }
        }
    }
    sim
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for warmup in [1u64, 600, 1800] {
        group.bench_with_input(BenchmarkId::new("after_warmup", warmup), &warmup, |b, &warmup| {
            b.iter_batched(
                || warmed_session(warmup),
                |mut sim| {
                    sim.tick();
                    black_box(sim.world().entity_count())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_state_hash(c: &mut Criterion) {
    let sim = warmed_session(600);
    c.bench_function("state_hash", |b| b.iter(|| black_box(sim.state_hash().unwrap())));
}

criterion_group!(benches, bench_tick, bench_state_hash);
criterion_main!(benches);
