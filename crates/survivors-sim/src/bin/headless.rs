//! Headless runner: drives a session for a fixed number of ticks and prints
//! the final state hash.
//!
//! Level-ups are resolved by always taking the first choice, so two runs with
//! the same seed and content print the same hash.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use survivors_sim::prelude::*;

/// Run the survivors simulation without presentation.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of ticks to simulate
    #[arg(short, long, default_value_t = 3600)]
    ticks: u64,

    /// Base seed; omit for the fixed default stream
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON game content; omit for the built-in content
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Circle the player around the origin instead of standing still
    #[arg(long)]
    kite: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<GameConfig> {
    let Some(path) = path else {
        return Ok(GameConfig::default());
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    GameConfig::from_json_str(&json).with_context(|| format!("loading {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = load_config(args.config.as_ref())?;
    let options = SimulationOptions {
        tick: TickConfig {
            headless: true,
            ..TickConfig::default()
        },
        seed: args.seed.map_or(SeedPolicy::FixedIndex0, SeedPolicy::Explicit),
        collision: CollisionSource::BuiltIn,
    };
    let mut sim = Simulation::new(config, options)?;

    let mut kills = 0u64;
    let mut level = 1u32;
    for tick in 0..args.ticks {
        if args.kite {
            let angle = tick as f32 * sim.fixed_dt() as f32 * 0.5;
            sim.set_input(Vec3::new(-angle.sin(), 0.0, angle.cos()));
        }
        for event in sim.tick() {
            match event {
                SimEvent::EnemyKilled { .. } => kills += 1,
                SimEvent::LevelUp { level: l, .. } => level = *l,
                _ => {}
            }
        }
        while sim.pending_level_up().is_some() {
            if sim.choose_upgrade(0).is_err() {
                sim.skip_level_up();
            }
        }
        if sim.is_game_over() {
            tracing::warn!(tick, "player died");
            break;
        }
    }

    let hash = sim.state_hash()?;
    println!(
        "ticks={} time={:.2}s entities={} level={} kills={} game_over={} hash={}",
        sim.tick_count(),
        sim.sim_time(),
        sim.world().entity_count(),
        level,
        kills,
        sim.is_game_over(),
        hash.to_hex()
    );
    Ok(())
}
