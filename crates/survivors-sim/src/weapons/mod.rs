//! Weapon attack state machine.
//!
//! A weapon entity cycles `Cooldown -> Active -> Cooldown`. The state is
//! carried by the enable bit of [`WeaponActive`] (disabled = Cooldown) plus
//! the counters in [`WeaponState`]:
//!
//! * Cooldown: `cooldown_timer` counts down; at `<= 0` the weapon becomes
//!   Active and continues in the same tick.
//! * Active: `next_attack_timer` counts down; at `<= 0` a target is selected.
//!   If there is none the timers are left untouched and the weapon retries
//!   next tick. Otherwise one attack is spawned, `attack_count` increments and
//!   the timer re-arms to the level's attack interval.
//! * Group complete: once `attack_count` reaches the level's attack count
//!   plus the owner's `AttackCount` stat, the group resets and the weapon
//!   returns to Cooldown for `level.cooldown * Cooldown stat` seconds.
//!
//! Target selection is skipped entirely while the weapon is cooling down,
//! and the enemy list is gathered at most once per tick, on first demand.

pub mod leveling;
pub mod spawning;
pub mod targeting;

use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::*;

use crate::components::{LastMoveDirection, LocalTransform};
use crate::resources::Resources;
use crate::rng::EntityRng;
use crate::stats::{stats_of, StatKind};
use crate::systems;

pub use leveling::{acquire_weapon, owned_weapon, upgrade_weapon, UPGRADE_COOLDOWN};
pub use spawning::{attack_bundle, AttackSpawn};
pub use targeting::{select_target, Aim, EnemyCache};

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WeaponKind {
    MagicWand,
    Knife,
    Axe,
    Cross,
    LightningRing,
    Garlic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponState {
    pub cooldown_timer: f32,
    pub next_attack_timer: f32,
    pub attack_count: i32,
    pub level_index: i32,
}

impl WeaponState {
    /// Level 0, ready to fire on the next tick.
    pub fn fresh() -> Self {
        Self {
            cooldown_timer: 0.0,
            next_attack_timer: 0.0,
            attack_count: 0,
            level_index: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub kind: WeaponKind,
    pub owner: EntityId,
}

/// Enabled while the weapon is spawning a group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponActive;

survivors_ecs::component!(
    WeaponState => "weapon_state",
    Weapon => "weapon",
    WeaponActive => "weapon_active",
);

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// What a single tick did to a weapon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponStep {
    CoolingDown,
    /// Active, waiting for the inter-attack timer.
    Waiting,
    /// Active, timer expired, no target found.
    NoTarget,
    Fired,
    /// Fired the last attack of the group and returned to Cooldown.
    GroupComplete,
}

/// Level parameters after the owner's stats are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupParams {
    /// Level attack count plus the `AttackCount` bonus.
    pub size: i32,
    /// Level cooldown times the `Cooldown` stat.
    pub cooldown: f32,
    pub interval: f32,
}

/// Count the timers down by `dt`. Returns [`WeaponStep::NoTarget`] when the
/// weapon is Active and ready to select a target; the caller either records
/// an attack or leaves the state as is.
pub fn advance_timers(state: &mut WeaponState, active: &mut bool, dt: f32) -> WeaponStep {
    if !*active {
        state.cooldown_timer -= dt;
        if state.cooldown_timer > 0.0 {
            return WeaponStep::CoolingDown;
        }
        *active = true;
    }
    if state.next_attack_timer > 0.0 {
        state.next_attack_timer -= dt;
    }
    if state.next_attack_timer > 0.0 {
        WeaponStep::Waiting
    } else {
        WeaponStep::NoTarget
    }
}

/// Record one spawned attack and close the group if it is complete.
pub fn record_attack(state: &mut WeaponState, active: &mut bool, params: GroupParams) -> WeaponStep {
    state.attack_count += 1;
    state.next_attack_timer = params.interval;
    if state.attack_count >= params.size {
        state.attack_count = 0;
        state.next_attack_timer = 0.0;
        state.cooldown_timer = params.cooldown;
        *active = false;
        return WeaponStep::GroupComplete;
    }
    WeaponStep::Fired
}

/// Run every weapon's state machine for this tick.
pub fn weapon_attacks(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let weapons = Query::new()
        .with_present::<Weapon>()
        .with_present::<WeaponState>()
        .collect(world);
    if weapons.is_empty() {
        return;
    }
    let dt = res.time.dt;
    let elapsed = res.time.elapsed;
    let mut enemies = EnemyCache::default();

    for weapon in weapons {
        let Some(Weapon { kind, owner }) = world.get_cloned::<Weapon>(weapon) else {
            continue;
        };
        if !world.is_alive(owner) {
            continue;
        }
        let Some(def) = res.prefabs.weapon(kind) else {
            tracing::warn!(weapon = ?weapon, ?kind, "weapon has no registered definition");
            continue;
        };
        let Some(mut state) = world.get_cloned::<WeaponState>(weapon) else {
            continue;
        };
        let Some(level) = def.level(state.level_index) else {
            continue;
        };
        let Some(owner_pos) = world.get::<LocalTransform>(owner).map(|t| t.position) else {
            continue;
        };

        let mut active = world.is_enabled::<WeaponActive>(weapon);
        let was_active = active;
        let mut step = advance_timers(&mut state, &mut active, dt);

        if step == WeaponStep::NoTarget {
            let stats = stats_of(world, owner);
            let params = GroupParams {
                size: level.attack_count + stats.bonus_attacks(),
                cooldown: level.cooldown * stats.get(StatKind::Cooldown),
                interval: level.attack_interval,
            };
            let last_dir = world
                .get::<LastMoveDirection>(owner)
                .map(|d| d.0)
                .unwrap_or(glam::Vec3::X);
            let mut rng = world
                .get_cloned::<EntityRng>(weapon)
                .unwrap_or_else(|| EntityRng::from_seed(weapon.to_raw()));

            let aim = select_target(
                kind,
                world,
                owner_pos,
                last_dir,
                res.camera.as_ref(),
                &mut enemies,
                &mut rng,
            );
            if let Some(aim) = aim {
                let spawn = AttackSpawn {
                    weapon,
                    owner,
                    kind,
                    level,
                    stats: &stats,
                    aim,
                    elapsed,
                };
                cmds.spawn(
                    attack_bundle(&spawn, &mut rng),
                    systems::WEAPON_ATTACKS,
                    CausalReason::timer("weapon_attack"),
                );
                step = record_attack(&mut state, &mut active, params);
                if step == WeaponStep::GroupComplete {
                    tracing::trace!(weapon = ?weapon, ?kind, cooldown = params.cooldown, "attack group complete");
                }
            }
            if let Some(slot) = world.write::<EntityRng>().get_mut(weapon) {
                *slot = rng;
            }
        }

        if active != was_active {
            world.set_enabled::<WeaponActive>(weapon, active);
        }
        if let Some(slot) = world.write::<WeaponState>().get_mut(weapon) {
            *slot = state;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: GroupParams = GroupParams {
        size: 3,
        cooldown: 1.0,
        interval: 0.1,
    };

    /// One tick of the state machine with a fixed target availability.
    fn run(state: &mut WeaponState, active: &mut bool, dt: f32, has_target: bool) -> WeaponStep {
        match advance_timers(state, active, dt) {
            WeaponStep::NoTarget if has_target => record_attack(state, active, PARAMS),
            step => step,
        }
    }

    #[test]
    fn cooldown_expiry_fires_in_same_tick() {
        let mut state = WeaponState {
            cooldown_timer: 0.05,
            ..WeaponState::fresh()
        };
        let mut active = false;
        assert_eq!(run(&mut state, &mut active, 0.1, true), WeaponStep::Fired);
        assert!(active);
        assert_eq!(state.attack_count, 1);
    }

    #[test]
    fn cooling_down_does_not_fire() {
        let mut state = WeaponState {
            cooldown_timer: 1.0,
            ..WeaponState::fresh()
        };
        let mut active = false;
        assert_eq!(run(&mut state, &mut active, 0.1, true), WeaponStep::CoolingDown);
        assert!(!active);
    }

    #[test]
    fn no_target_leaves_timers_untouched() {
        let mut state = WeaponState::fresh();
        let mut active = true;
        for _ in 0..10 {
            assert_eq!(run(&mut state, &mut active, 0.1, false), WeaponStep::NoTarget);
        }
        assert_eq!(state, WeaponState::fresh());
        assert!(active);
    }

    #[test]
    fn group_completes_after_group_size_attacks() {
        let mut state = WeaponState::fresh();
        let mut active = true;
        let mut fired = 0;
        let mut last = WeaponStep::Waiting;
        while active {
            last = run(&mut state, &mut active, 0.1, true);
            if matches!(last, WeaponStep::Fired | WeaponStep::GroupComplete) {
                fired += 1;
            }
        }
        assert_eq!(fired, 3);
        assert_eq!(last, WeaponStep::GroupComplete);
        assert_eq!(state.attack_count, 0);
        assert_eq!(state.next_attack_timer, 0.0);
        assert_eq!(state.cooldown_timer, 1.0);
    }

    #[test]
    fn group_size_includes_bonus_attacks() {
        let params = GroupParams { size: 1 + 1, ..PARAMS };
        let mut state = WeaponState::fresh();
        let mut active = true;
        assert_eq!(record_attack(&mut state, &mut active, params), WeaponStep::Fired);
        assert!(active);
        assert_eq!(state.next_attack_timer, params.interval);
        assert_eq!(record_attack(&mut state, &mut active, params), WeaponStep::GroupComplete);
        assert!(!active);
        assert_eq!(state.attack_count, 0);
        assert_eq!(state.next_attack_timer, 0.0);
        assert_eq!(state.cooldown_timer, params.cooldown);
    }

    #[test]
    fn attack_count_stat_adds_attacks_to_each_group() {
        use crate::components::{register_all, Enemy, EnemyType};
        use crate::stats::{CharacterStatModificationState, StatModifier};

        let mut world = World::new();
        register_all(&mut world);
        let owner = world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(LocalTransform::at(glam::Vec3::ZERO))
                    .with(LastMoveDirection(glam::Vec3::X))
                    .with(CharacterStatModificationState::aggregate(&[StatModifier::new(
                        StatKind::AttackCount,
                        1.0,
                    )])),
            )
            .unwrap();
        world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Enemy {
                        kind: EnemyType::new("bat"),
                    })
                    .with(LocalTransform::at(glam::Vec3::new(3.0, 0.0, 0.0))),
            )
            .unwrap();
        let weapon = world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Weapon {
                        kind: WeaponKind::MagicWand,
                        owner,
                    })
                    .with(WeaponState::fresh())
                    .with_disabled(WeaponActive)
                    .with(EntityRng::from_seed(7)),
            )
            .unwrap();

        let mut res = Resources::for_tests();
        let mut cmds = CommandBuffer::new();
        // The wand's level 0 fires one attack; the stat adds a second,
        // `attack_interval` later.
        let mut ticks = 0;
        loop {
            weapon_attacks(&world, &mut res, &mut cmds);
            ticks += 1;
            if !world.is_enabled::<WeaponActive>(weapon) {
                break;
            }
            assert!(ticks < 60, "group never completed");
        }
        assert!(ticks > 1, "second attack must wait for the interval");
        assert_eq!(cmds.len(), 2);

        let state = world.get_cloned::<WeaponState>(weapon).unwrap();
        assert_eq!(state.attack_count, 0);
        assert_eq!(state.next_attack_timer, 0.0);
        assert!((state.cooldown_timer - 1.2).abs() < 1e-6);

        // Cooling down: nothing more this side of the cooldown.
        for _ in 0..30 {
            weapon_attacks(&world, &mut res, &mut cmds);
        }
        assert_eq!(cmds.len(), 2);
    }

    #[test]
    fn interval_gates_attacks_within_group() {
        let mut state = WeaponState::fresh();
        let mut active = true;
        run(&mut state, &mut active, 0.04, true);
        assert_eq!(run(&mut state, &mut active, 0.04, true), WeaponStep::Waiting);
        assert_eq!(state.attack_count, 1);
    }
}
