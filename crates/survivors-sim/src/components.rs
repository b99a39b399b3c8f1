//! Shared gameplay components and world registration.
//!
//! Role tags, transforms, health and the enable-flag components used as
//! lightweight state machines live here. Components owned by a single
//! subsystem (stats, interactions, weapons, waves) are declared next to the
//! systems that drive them; [`register_all`] registers every one of them.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::*;

use crate::interaction::EntityInteraction;
use crate::rng::EntityRng;
use crate::stats::{
    ActiveStatModifierEntity, CharacterStatModificationState, ModifierSourceOwner,
    PendingModifierLink, RecalculateStatsFlag, StatModifier,
};
use crate::upgrades::PassiveItem;
use crate::waves::{EnemySpawnWaveData, EnemySpawnerState, SpawnEvent, WaveSchedule};
use crate::weapons::{Weapon, WeaponActive, WeaponKind, WeaponState};

// ---------------------------------------------------------------------------
// Transform and roles
// ---------------------------------------------------------------------------

/// World-space position on the XZ play plane (Y is up) and facing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalTransform {
    pub position: Vec3,
    pub heading: Vec3,
}

impl LocalTransform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            heading: Vec3::X,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Player;

/// Key into the enemy prefab registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyType(pub String);

impl EnemyType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for EnemyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enemy {
    pub kind: EnemyType,
}

/// Marks the per-wave boss. `bonus_crate_chance` is a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boss {
    pub bonus_crate_chance: f32,
}

/// An attack instance spawned by a weapon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attack {
    pub weapon: EntityId,
    pub kind: WeaponKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PickupKind {
    Experience(u32),
    BonusCrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub kind: PickupKind,
}

// ---------------------------------------------------------------------------
// Health and damage
// ---------------------------------------------------------------------------

/// Current hit points and the base maximum before stat modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub base: i32,
}

impl Health {
    pub fn full(base: i32) -> Self {
        Self {
            current: base,
            base,
        }
    }
}

/// One signed entry in a damageable entity's per-frame buffer. Positive is
/// damage, negative is healing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageThisFrame(pub i32);

/// Enabled while positive damage is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Invincible;

/// Invincibility window granted after taking damage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Invincibility {
    pub window: f32,
    pub remaining: f32,
}

/// Enabled for the frame in which the entity took damage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageTakenFlag;

/// Enabled when the entity should be destroyed with normal drops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DestroyEntityFlag;

/// Enabled when a destroy effect should be emitted for the entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DestroyEffectRequest;

/// Enabled when the entity should be removed without drops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstantDestroy;

/// Fractional hit points regenerated but not yet applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Regeneration {
    pub carry: f32,
}

// ---------------------------------------------------------------------------
// Attacks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackDamage(pub i32);

/// Seconds left before the entity is flagged for destruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lifetime {
    pub remaining: f32,
}

/// Hits left before the attack is spent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitLimit {
    pub remaining: u32,
}

/// Circle radius on the XZ plane used by the built-in overlap pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionRadius(pub f32);

/// Scripted motion evaluated from elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Movement {
    Linear {
        direction: Vec3,
        speed: f32,
    },
    Sine {
        direction: Vec3,
        speed: f32,
        amplitude: f32,
        frequency: f32,
    },
    Parabolic {
        velocity: Vec3,
        gravity: Vec3,
    },
    Boomerang {
        direction: Vec3,
        speed: f32,
        deceleration: f32,
    },
    Stationary,
}

/// Origin and start time for [`Movement`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementStart {
    pub origin: Vec3,
    pub start_time: f64,
}

/// Keeps the entity positioned on its owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowOwner(pub EntityId);

/// Periodically forgets handled interactions so the attack can hit the same
/// target again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRefresh {
    pub interval: f32,
    pub timer: f32,
}

// ---------------------------------------------------------------------------
// Enemies and player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChasePlayer {
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactDamage(pub i32);

/// Experience orb dropped on death. `chance` is a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperienceDrop {
    pub amount: u32,
    pub chance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerExperience {
    pub level: u32,
    pub current: f32,
    pub to_next: f32,
    /// Raw experience collected this frame, before the gain multiplier.
    pub pending: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastMoveDirection(pub Vec3);

/// Base pickup radius before the `PickupRadius` stat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupRange(pub f32);

/// Base movement speed before the `MoveSpeed` stat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveSpeed(pub f32);

survivors_ecs::component!(
    LocalTransform => "local_transform",
    Player => "player",
    Enemy => "enemy",
    Boss => "boss",
    Attack => "attack",
    Pickup => "pickup",
    Health => "health",
    Invincible => "invincible",
    Invincibility => "invincibility",
    DamageTakenFlag => "damage_taken_flag",
    DestroyEntityFlag => "destroy_entity_flag",
    DestroyEffectRequest => "destroy_effect_request",
    InstantDestroy => "instant_destroy",
    Regeneration => "regeneration",
    AttackDamage => "attack_damage",
    Lifetime => "lifetime",
    HitLimit => "hit_limit",
    CollisionRadius => "collision_radius",
    Movement => "movement",
    MovementStart => "movement_start",
    FollowOwner => "follow_owner",
    InteractionRefresh => "interaction_refresh",
    ChasePlayer => "chase_player",
    ContactDamage => "contact_damage",
    ExperienceDrop => "experience_drop",
    PlayerExperience => "player_experience",
    LastMoveDirection => "last_move_direction",
    PickupRange => "pickup_range",
    MoveSpeed => "move_speed",
);
survivors_ecs::buffer_element!(DamageThisFrame => "damage_this_frame");

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register every simulation component and buffer with `world`.
pub fn register_all(world: &mut World) {
    world.register::<LocalTransform>();
    world.register::<Player>();
    world.register::<Enemy>();
    world.register::<Boss>();
    world.register::<Attack>();
    world.register::<Pickup>();
    world.register::<Health>();
    world.register_buffer::<DamageThisFrame>();
    world.register::<Invincible>();
    world.register::<Invincibility>();
    world.register::<DamageTakenFlag>();
    world.register::<DestroyEntityFlag>();
    world.register::<DestroyEffectRequest>();
    world.register::<InstantDestroy>();
    world.register::<Regeneration>();
    world.register::<AttackDamage>();
    world.register::<Lifetime>();
    world.register::<HitLimit>();
    world.register::<CollisionRadius>();
    world.register::<Movement>();
    world.register::<MovementStart>();
    world.register::<FollowOwner>();
    world.register::<InteractionRefresh>();
    world.register::<ChasePlayer>();
    world.register::<ContactDamage>();
    world.register::<ExperienceDrop>();
    world.register::<PlayerExperience>();
    world.register::<LastMoveDirection>();
    world.register::<PickupRange>();
    world.register::<MoveSpeed>();

    world.register_buffer::<EntityInteraction>();

    world.register_buffer::<StatModifier>();
    world.register_buffer::<ActiveStatModifierEntity>();
    world.register::<CharacterStatModificationState>();
    world.register::<RecalculateStatsFlag>();
    world.register::<ModifierSourceOwner>();
    world.register::<PendingModifierLink>();
    world.register::<PassiveItem>();

    world.register::<Weapon>();
    world.register::<WeaponState>();
    world.register::<WeaponActive>();
    world.register::<EntityRng>();

    world.register::<EnemySpawnerState>();
    world.register::<WaveSchedule>();
    world.register::<EnemySpawnWaveData>();
    world.register_buffer::<SpawnEvent>();
}

/// The flags every destroyable entity carries, all disabled.
pub fn with_destroy_flags(bundle: ComponentBundle) -> ComponentBundle {
    bundle
        .with_disabled(DestroyEntityFlag)
        .with_disabled(DestroyEffectRequest)
        .with_disabled(InstantDestroy)
}

/// Position of `entity`, if it has a transform.
pub fn position_of(world: &World, entity: EntityId) -> Option<Vec3> {
    world.get::<LocalTransform>(entity).map(|t| t.position)
}

/// Distance between two points on the XZ plane.
pub fn distance_xz(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

/// Unit direction from `from` to `to` on the XZ plane, `None` if they
/// coincide.
pub fn direction_xz(from: Vec3, to: Vec3) -> Option<Vec3> {
    let d = Vec3::new(to.x - from.x, 0.0, to.z - from.z);
    d.try_normalize()
}
