//! Fixed-timestep, phased system schedule.
//!
//! Each tick the [`Schedule`] walks its phases in [`Phase::ALL`] order and,
//! within a phase, its systems in registration order. Every system receives
//! a shared reference to the [`World`], the session [`Resources`] and the
//! shared [`CommandBuffer`]. The buffer is played back right after the system
//! returns, so the next system sees the previous one's structural changes and
//! never a half-applied state.
//!
//! Because system order is fixed, playback is FIFO and all randomness comes
//! from seeded generators, a tick is deterministic: same initial state, same
//! systems, same inputs, same result.
//!
//! # Example
//!
//! ```
//! use survivors_ecs::prelude::*;
//! use survivors_sim::resources::Resources;
//! use survivors_sim::schedule::{Phase, Schedule};
//!
//! fn noop(_world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {}
//!
//! let mut schedule = Schedule::new();
//! schedule.add_system(Phase::Simulation, "noop", noop);
//! schedule.add_system_after(Phase::Resolution, "cleanup", &["noop"], noop);
//! assert_eq!(schedule.system_names(), vec!["noop", "cleanup"]);
//! ```

use std::time::{Duration, Instant};

use survivors_ecs::prelude::*;

use crate::resources::Resources;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// No presentation attached; tick as fast as possible.
    pub headless: bool,
}

impl Default for TickConfig {
    /// 60 Hz, headless off.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
        }
    }
}

impl TickConfig {
    /// # Panics
    ///
    /// Panics if `fixed_dt` is not positive and finite.
    pub fn validate(&self) {
        assert!(
            self.fixed_dt > 0.0 && self.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            self.fixed_dt
        );
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Named groups of systems, run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Wave advancement, spawning and character setup.
    Initialization,
    /// Timers, movement and weapons.
    Simulation,
    /// Overlaps, interactions and their consumers.
    Interaction,
    /// Damage, stats, experience and destruction.
    Resolution,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Initialization,
        Phase::Simulation,
        Phase::Interaction,
        Phase::Resolution,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Per-system timing and command counts for one tick.
#[derive(Debug, Clone, Default)]
pub struct SystemDiagnostics {
    pub name: String,
    pub time: Duration,
    /// Commands played back after this system.
    pub commands: usize,
    pub failed_commands: usize,
}

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// In order of execution. Systems in disabled phases are absent.
    pub systems: Vec<SystemDiagnostics>,
    /// Total time for the tick (systems plus command playback).
    pub total_time: Duration,
    /// Time spent applying commands.
    pub command_apply_time: Duration,
}

impl TickDiagnostics {
    pub fn command_count(&self) -> usize {
        self.systems.iter().map(|s| s.commands).sum()
    }

    pub fn failed_command_count(&self) -> usize {
        self.systems.iter().map(|s| s.failed_commands).sum()
    }
}

// ---------------------------------------------------------------------------
// SystemFn / RegisteredSystem
// ---------------------------------------------------------------------------

/// A system: reads the world, mutates resources, queues structural changes.
pub type SystemFn = fn(&World, &mut Resources, &mut CommandBuffer);

#[derive(Debug)]
struct RegisteredSystem {
    name: String,
    phase: Phase,
    func: SystemFn,
    /// Systems that must run before this one.
    after: Vec<String>,
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// The ordered system list plus the shared command buffer.
#[derive(Debug)]
pub struct Schedule {
    /// Sorted by phase, then registration order.
    systems: Vec<RegisteredSystem>,
    phase_enabled: [bool; 4],
    command_buffer: CommandBuffer,
    last_diagnostics: TickDiagnostics,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            phase_enabled: [true; 4],
            command_buffer: CommandBuffer::new(),
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    /// Register `func` at the end of `phase`.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same name is already registered.
    pub fn add_system(&mut self, phase: Phase, name: &str, func: SystemFn) {
        self.add_system_after(phase, name, &[], func);
    }

    /// Register `func` at the end of `phase`, declaring systems that must run
    /// before it.
    ///
    /// # Panics
    ///
    /// - If any system in `after` is not already registered.
    /// - If a system in `after` belongs to a later phase.
    /// - If a system with this name already exists.
    /// - If the dependency graph would contain a cycle.
    pub fn add_system_after(&mut self, phase: Phase, name: &str, after: &[&str], func: SystemFn) {
        for dep in after {
            let Some(dep_phase) = self.systems.iter().find(|s| s.name == *dep).map(|s| s.phase) else {
                panic!("system '{name}' declares dependency on '{dep}', but '{dep}' is not registered");
            };
            assert!(
                dep_phase <= phase,
                "system '{name}' in {phase:?} cannot run after '{dep}' in later phase {dep_phase:?}"
            );
        }
        assert!(
            !self.systems.iter().any(|s| s.name == name),
            "duplicate system name: {name:?}"
        );

        // Append after the last system of the same or an earlier phase.
        let at = self.systems.iter().take_while(|s| s.phase <= phase).count();
        self.systems.insert(
            at,
            RegisteredSystem {
                name: name.to_owned(),
                phase,
                func,
                after: after.iter().map(|s| s.to_string()).collect(),
            },
        );
        self.validate_system_order();
    }

    /// Depth-first search with a recursion stack to detect back edges.
    ///
    /// # Panics
    ///
    /// Panics if a cycle is detected.
    fn validate_system_order(&self) {
        let mut visited = vec![false; self.systems.len()];
        let mut in_stack = vec![false; self.systems.len()];

        fn dfs(systems: &[RegisteredSystem], idx: usize, visited: &mut [bool], in_stack: &mut [bool]) -> bool {
            if in_stack[idx] {
                return false;
            }
            if visited[idx] {
                return true;
            }
            visited[idx] = true;
            in_stack[idx] = true;
            for dep_name in &systems[idx].after {
                if let Some(dep_idx) = systems.iter().position(|s| s.name == *dep_name) {
                    if !dfs(systems, dep_idx, visited, in_stack) {
                        return false;
                    }
                }
            }
            in_stack[idx] = false;
            true
        }

        for i in 0..self.systems.len() {
            assert!(
                dfs(&self.systems, i, &mut visited, &mut in_stack),
                "cycle detected in system dependencies"
            );
        }
    }

    /// Run every enabled phase once, playing commands back after each system.
    pub fn run(&mut self, world: &mut World, res: &mut Resources) -> &TickDiagnostics {
        let tick_start = Instant::now();
        let mut systems = Vec::with_capacity(self.systems.len());
        let mut command_apply_time = Duration::ZERO;

        for system in &self.systems {
            if !self.phase_enabled[system.phase.index()] {
                continue;
            }
            let sys_start = Instant::now();
            (system.func)(world, res, &mut self.command_buffer);
            let time = sys_start.elapsed();

            let mut commands = 0;
            let mut failed_commands = 0;
            if !self.command_buffer.is_empty() {
                let apply_start = Instant::now();
                let applied = self.command_buffer.apply(world);
                command_apply_time += apply_start.elapsed();
                commands = applied.len();
                failed_commands = applied.iter().filter(|c| !c.applied_successfully).count();
                tracing::trace!(system = %system.name, commands, failed_commands, "commands applied");
            }
            systems.push(SystemDiagnostics {
                name: system.name.clone(),
                time,
                commands,
                failed_commands,
            });
        }

        self.last_diagnostics = TickDiagnostics {
            systems,
            total_time: tick_start.elapsed(),
            command_apply_time,
        };
        &self.last_diagnostics
    }

    // -- phase control ------------------------------------------------------

    pub fn set_phase_enabled(&mut self, phase: Phase, enabled: bool) {
        self.phase_enabled[phase.index()] = enabled;
    }

    pub fn is_phase_enabled(&self, phase: Phase) -> bool {
        self.phase_enabled[phase.index()]
    }

    /// Disable every phase.
    pub fn pause(&mut self) {
        self.phase_enabled = [false; 4];
    }

    /// Enable every phase.
    pub fn resume(&mut self) {
        self.phase_enabled = [true; 4];
    }

    /// `true` when no phase is enabled.
    pub fn is_paused(&self) -> bool {
        self.phase_enabled.iter().all(|e| !e)
    }

    // -- accessors ----------------------------------------------------------

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    /// Names of the systems in `phase`, in execution order.
    pub fn phase_systems(&self, phase: Phase) -> Vec<&str> {
        self.systems
            .iter()
            .filter(|s| s.phase == phase)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{register_all, LocalTransform, Player};
    use glam::Vec3;

    fn noop(_world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {}

    fn spawn_player(_world: &World, _res: &mut Resources, cmds: &mut CommandBuffer) {
        cmds.spawn(
            ComponentBundle::new().with(Player).with(LocalTransform::at(Vec3::ZERO)),
            SystemId(1),
            CausalReason::internal("test"),
        );
    }

    /// Sees the spawn from the previous system because playback happens in
    /// between.
    fn nudge_players(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
        let players = Query::new().with::<Player>().collect(world);
        let mut transforms = world.write::<LocalTransform>();
        for p in players {
            if let Some(t) = transforms.get_mut(p) {
                t.position.x += 1.0;
            }
        }
    }

    fn count_tick(_world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
        res.time.tick += 1;
    }

    fn world() -> World {
        let mut world = World::new();
        register_all(&mut world);
        world
    }

    // -- 1. Construction ----------------------------------------------------

    #[test]
    fn tick_config_defaults_to_60hz() {
        let config = TickConfig::default();
        assert!((config.fixed_dt - 1.0 / 60.0).abs() < f64::EPSILON);
        assert!(!config.headless);
        config.validate();
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn zero_dt_panics() {
        TickConfig {
            fixed_dt: 0.0,
            headless: true,
        }
        .validate();
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn infinite_dt_panics() {
        TickConfig {
            fixed_dt: f64::INFINITY,
            headless: true,
        }
        .validate();
    }

    // -- 2. Registration ----------------------------------------------------

    #[test]
    fn systems_are_ordered_by_phase_then_registration() {
        let mut schedule = Schedule::new();
        schedule.add_system(Phase::Resolution, "destroy", noop);
        schedule.add_system(Phase::Initialization, "waves", noop);
        schedule.add_system(Phase::Simulation, "move", noop);
        schedule.add_system(Phase::Initialization, "spawn", noop);
        assert_eq!(schedule.system_names(), vec!["waves", "spawn", "move", "destroy"]);
        assert_eq!(schedule.phase_systems(Phase::Initialization), vec!["waves", "spawn"]);
        assert_eq!(schedule.system_count(), 4);
    }

    #[test]
    #[should_panic(expected = "duplicate system name")]
    fn duplicate_name_panics() {
        let mut schedule = Schedule::new();
        schedule.add_system(Phase::Simulation, "move", noop);
        schedule.add_system(Phase::Resolution, "move", noop);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn unknown_dependency_panics() {
        let mut schedule = Schedule::new();
        schedule.add_system_after(Phase::Simulation, "move", &["input"], noop);
    }

    #[test]
    #[should_panic(expected = "later phase")]
    fn dependency_in_later_phase_panics() {
        let mut schedule = Schedule::new();
        schedule.add_system(Phase::Resolution, "destroy", noop);
        schedule.add_system_after(Phase::Simulation, "move", &["destroy"], noop);
    }

    // -- 3. Running ---------------------------------------------------------

    #[test]
    fn later_systems_see_earlier_structural_changes() {
        let mut world = world();
        let mut res = Resources::for_tests();
        let mut schedule = Schedule::new();
        schedule.add_system(Phase::Initialization, "spawn_player", spawn_player);
        schedule.add_system_after(Phase::Simulation, "nudge", &["spawn_player"], nudge_players);

        let diagnostics = schedule.run(&mut world, &mut res);
        assert_eq!(diagnostics.systems.len(), 2);
        assert_eq!(diagnostics.systems[0].commands, 1);
        assert_eq!(diagnostics.command_count(), 1);
        assert_eq!(diagnostics.failed_command_count(), 0);

        let player = Query::new().with::<Player>().single(&world).unwrap();
        assert_eq!(world.get_cloned::<LocalTransform>(player).unwrap().position.x, 1.0);
    }

    #[test]
    fn disabled_phases_are_skipped() {
        let mut world = world();
        let mut res = Resources::for_tests();
        let mut schedule = Schedule::new();
        schedule.add_system(Phase::Simulation, "count", count_tick);
        schedule.add_system(Phase::Resolution, "noop", noop);

        schedule.set_phase_enabled(Phase::Simulation, false);
        assert!(!schedule.is_paused());
        let diagnostics = schedule.run(&mut world, &mut res);
        assert_eq!(diagnostics.systems.len(), 1);
        assert_eq!(res.time.tick, 0);

        schedule.pause();
        assert!(schedule.is_paused());
        schedule.run(&mut world, &mut res);
        assert!(schedule.last_diagnostics().systems.is_empty());

        schedule.resume();
        schedule.run(&mut world, &mut res);
        assert_eq!(res.time.tick, 1);
        assert!(schedule.is_phase_enabled(Phase::Simulation));
    }
}
