//! Interaction buffer protocol.
//!
//! Detection and effect are decoupled: the collision pass only records "owner
//! touched target" into the owner's `Buffer<EntityInteraction>`, and consumer
//! systems later read the unhandled entries and apply damage, pickups and so
//! on. [`mark_interactions_handled`] runs last in the interaction phase and
//! flips every entry to handled in one global pass. Entries are not cleared
//! by that pass; they form a sliding dedup window.
//!
//! Growth is bounded two ways:
//!
//! * [`compact_interactions`] periodically drops handled entries whose target
//!   no longer exists.
//! * Attacks with an [`InteractionRefresh`] drop all handled entries every
//!   interval so they can hit the same target again.
//!
//! Unhandled entries are never removed by either.

use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::*;

use crate::components::{
    Attack, AttackDamage, DamageThisFrame, DestroyEntityFlag, Enemy, Health, HitLimit,
    InteractionRefresh, Pickup, Player,
};
use crate::resources::Resources;

// ---------------------------------------------------------------------------
// EntityInteraction
// ---------------------------------------------------------------------------

/// "The owner of this buffer interacted with `target`."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInteraction {
    pub handled: bool,
    pub target: EntityId,
}

survivors_ecs::buffer_element!(EntityInteraction => "entity_interactions");

/// How a producer deduplicates against existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Skip if `target` appears anywhere in the buffer. A projectile hits
    /// each target at most once in its lifetime.
    Lifetime,
    /// Skip if an unhandled entry for `target` exists. A handled entry for
    /// the same target is re-armed instead of appending a new one, so the
    /// buffer holds at most one entry per target.
    Unhandled,
    AllowDuplicates,
}

/// Record an interaction with `target`. Returns `true` if a new unhandled
/// entry now exists because of this call.
pub fn raise_interaction(
    buffer: &mut Vec<EntityInteraction>,
    target: EntityId,
    policy: DedupPolicy,
) -> bool {
    match policy {
        DedupPolicy::Lifetime => {
            if buffer.iter().any(|e| e.target == target) {
                return false;
            }
        }
        DedupPolicy::Unhandled => {
            if let Some(existing) = buffer.iter_mut().find(|e| e.target == target) {
                if !existing.handled {
                    return false;
                }
                existing.handled = false;
                return true;
            }
        }
        DedupPolicy::AllowDuplicates => {}
    }
    buffer.push(EntityInteraction {
        handled: false,
        target,
    });
    true
}

/// Visit every unhandled entry in order.
pub fn for_each_unhandled(buffer: &[EntityInteraction], mut f: impl FnMut(EntityId)) {
    for entry in buffer.iter().filter(|e| !e.handled) {
        f(entry.target);
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Pair roles recognised by [`raise_interactions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairRole {
    AttackHitsEnemy,
    EnemyTouchesPlayer,
    PlayerTouchesPickup,
}

fn classify(world: &World, owner: EntityId, target: EntityId) -> Option<PairRole> {
    if world.has::<Attack>(owner) && world.has::<Enemy>(target) {
        Some(PairRole::AttackHitsEnemy)
    } else if world.has::<Enemy>(owner) && world.has::<Player>(target) {
        Some(PairRole::EnemyTouchesPlayer)
    } else if world.has::<Pickup>(owner) && world.has::<Player>(target) {
        Some(PairRole::PlayerTouchesPickup)
    } else {
        None
    }
}

/// Turn this tick's trigger pairs into interactions on the owning entity.
///
/// Pairs are unordered; both orientations are tried. Pairs that involve a
/// dead entity, a spent attack, or no recognised role are dropped.
pub fn raise_interactions(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let pairs = std::mem::take(&mut res.trigger_pairs);
    if pairs.is_empty() {
        return;
    }
    let mut buffers = world.write::<Buffer<EntityInteraction>>();
    for (a, b) in pairs {
        if !world.is_alive(a) || !world.is_alive(b) {
            continue;
        }
        let oriented = classify(world, a, b)
            .map(|role| (a, b, role))
            .or_else(|| classify(world, b, a).map(|role| (b, a, role)));
        let Some((owner, target, role)) = oriented else {
            continue;
        };
        if world.is_enabled::<DestroyEntityFlag>(owner) {
            continue;
        }
        let policy = match role {
            PairRole::AttackHitsEnemy | PairRole::PlayerTouchesPickup => DedupPolicy::Lifetime,
            PairRole::EnemyTouchesPlayer => DedupPolicy::Unhandled,
        };
        if let Some(buffer) = buffers.get_mut(owner) {
            raise_interaction(buffer, target, policy);
        }
    }
}

// ---------------------------------------------------------------------------
// Consumers
// ---------------------------------------------------------------------------

/// Append attack damage to every enemy an attack touched this frame and
/// spend its hit limit.
pub fn apply_attack_hits(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
    let attacks = Query::new()
        .with::<Attack>()
        .with_present::<Buffer<EntityInteraction>>()
        .without::<DestroyEntityFlag>();
    let buffers = world.read::<Buffer<EntityInteraction>>();
    let damage = world.read::<AttackDamage>();
    let mut limits = world.write::<HitLimit>();
    let mut frames = world.write::<Buffer<DamageThisFrame>>();

    for attack in attacks.iter(world) {
        let (Some(buffer), Some(amount)) = (buffers.get(attack), damage.get(attack)) else {
            continue;
        };
        for_each_unhandled(buffer, |target| {
            if world.is_enabled::<DestroyEntityFlag>(attack)
                || world.is_enabled::<DestroyEntityFlag>(target)
                || !world.has::<Health>(target)
            {
                return;
            }
            let Some(frame) = frames.get_mut(target) else {
                return;
            };
            frame.push(DamageThisFrame(amount.0));
            if let Some(limit) = limits.get_mut(attack) {
                limit.remaining = limit.remaining.saturating_sub(1);
                if limit.remaining == 0 {
                    world.set_enabled::<DestroyEntityFlag>(attack, true);
                }
            }
        });
    }
}

/// Mark every interaction handled. Must run after all consumers.
pub fn mark_interactions_handled(world: &World, _res: &mut Resources, _cmds: &mut CommandBuffer) {
    let mut buffers = world.write::<Buffer<EntityInteraction>>();
    for (_, buffer) in buffers.iter_mut() {
        for entry in buffer.iter_mut() {
            entry.handled = true;
        }
    }
}

/// Drop handled entries whose target is gone, every
/// `interactions.compaction_interval_ticks` ticks.
pub fn compact_interactions(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let interval = res.config.interactions.compaction_interval_ticks;
    if interval == 0 || res.time.tick % interval != 0 {
        return;
    }
    let mut buffers = world.write::<Buffer<EntityInteraction>>();
    let mut removed = 0usize;
    for (_, buffer) in buffers.iter_mut() {
        let before = buffer.len();
        buffer.retain(|e| !e.handled || world.is_alive(e.target));
        removed += before - buffer.len();
    }
    if removed > 0 {
        tracing::trace!(removed, tick = res.time.tick, "compacted interaction buffers");
    }
}

/// Let refreshing attacks hit the same targets again once their interval
/// elapses.
pub fn refresh_auras(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let dt = res.time.dt;
    let mut refresh = world.write::<InteractionRefresh>();
    let mut buffers = world.write::<Buffer<EntityInteraction>>();
    for (entity, state) in refresh.iter_mut() {
        state.timer -= dt;
        if state.timer > 0.0 {
            continue;
        }
        state.timer += state.interval.max(dt);
        if let Some(buffer) = buffers.get_mut(entity) {
            buffer.retain(|e| !e.handled);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
