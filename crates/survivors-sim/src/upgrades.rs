//! Upgrade descriptors, the rarity table and upgrade application.

use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::*;

use crate::error::SimError;
use crate::events::SimEvent;
use crate::resources::Resources;
use crate::rng::EntityRng;
use crate::stats::{modifier_source_bundle, ModifierSourceOwner, RecalculateStatsFlag, StatModifier};
use crate::systems;
use crate::weapons::{acquire_weapon, owned_weapon, WeaponKind, WeaponState};

/// One option offered on level-up or granted by a bonus crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeDescriptor {
    NewWeapon(WeaponKind),
    WeaponLevel(WeaponKind),
    Passive(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityTier {
    pub name: String,
    pub weight: u32,
    pub upgrades: Vec<UpgradeDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RarityTable {
    pub tiers: Vec<RarityTier>,
}

/// A passive item held by a character. Lives on the passive's modifier
/// source entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveItem {
    pub id: String,
    pub level: usize,
}

survivors_ecs::component!(PassiveItem => "passive_item");

// ---------------------------------------------------------------------------
// Rolling
// ---------------------------------------------------------------------------

/// Pick a tier by weight, then a uniform descriptor within it.
///
/// An all-zero table or a chosen tier with no upgrades is an invariant
/// violation: it is logged and `None` is returned.
pub fn roll_upgrade(table: &RarityTable, rng: &mut EntityRng) -> Option<UpgradeDescriptor> {
    let total: u64 = table.tiers.iter().map(|t| u64::from(t.weight)).sum();
    if total == 0 {
        tracing::error!("rarity table has no weighted tiers");
        return None;
    }
    let total = i32::try_from(total).unwrap_or(i32::MAX);
    let mut pick = i64::from(rng.range_i32(0, total));
    let tier = table.tiers.iter().find(|t| {
        pick -= i64::from(t.weight);
        pick < 0
    })?;
    let Some(index) = rng.index(tier.upgrades.len()) else {
        tracing::error!(error = %SimError::EmptyRarityTier { tier: tier.name.clone() }, "upgrade roll aborted");
        return None;
    };
    Some(tier.upgrades[index].clone())
}

/// `true` if `desc` would change something for `player` right now.
pub fn is_applicable(world: &World, res: &Resources, player: EntityId, desc: &UpgradeDescriptor) -> bool {
    match desc {
        UpgradeDescriptor::NewWeapon(kind) => {
            res.prefabs.weapon(*kind).is_some() && owned_weapon(world, player, *kind).is_none()
        }
        UpgradeDescriptor::WeaponLevel(kind) => {
            let (Some(def), Some(weapon)) = (res.prefabs.weapon(*kind), owned_weapon(world, player, *kind)) else {
                return false;
            };
            world
                .get::<WeaponState>(weapon)
                .and_then(|s| usize::try_from(s.level_index).ok())
                .is_some_and(|level| level < def.max_level_index())
        }
        UpgradeDescriptor::Passive(id) => {
            let Some(def) = res.prefabs.passive(id) else {
                return false;
            };
            match owned_passive(world, player, id) {
                Some((_, level)) => level + 1 < def.levels.len(),
                None => true,
            }
        }
    }
}

/// Roll up to `count` distinct applicable choices for `player`.
pub fn roll_choices(
    world: &World,
    res: &Resources,
    player: EntityId,
    count: usize,
    rng: &mut EntityRng,
) -> Vec<UpgradeDescriptor> {
    let mut choices: Vec<UpgradeDescriptor> = Vec::with_capacity(count);
    let attempts = count * 16;
    for _ in 0..attempts {
        if choices.len() >= count {
            break;
        }
        let Some(desc) = roll_upgrade(&res.config.rarity, rng) else {
            break;
        };
        if !choices.contains(&desc) && is_applicable(world, res, player, &desc) {
            choices.push(desc);
        }
    }
    choices
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// The modifier source holding passive `id` for `owner`, and its level.
pub fn owned_passive(world: &World, owner: EntityId, id: &str) -> Option<(EntityId, usize)> {
    let items = world.read::<PassiveItem>();
    let owners = world.read::<ModifierSourceOwner>();
    let found = items
        .iter()
        .find(|(e, item)| item.id == id && owners.get(*e).is_some_and(|o| o.0 == owner) && world.is_alive(*e))
        .map(|(e, item)| (e, item.level));
    found
}

/// Apply `desc` to `player`.
///
/// Weapons go through [`acquire_weapon`]. A new passive spawns a modifier
/// source with its first level's modifiers; an owned one has its modifier
/// buffer replaced with the next level's and its owner flagged for stat
/// recalculation.
pub fn apply_upgrade(
    world: &World,
    res: &mut Resources,
    cmds: &mut CommandBuffer,
    player: EntityId,
    desc: &UpgradeDescriptor,
) -> Result<(), SimError> {
    if !world.is_alive(player) {
        return Err(SimError::Ecs(EcsError::StaleEntity { entity: player }));
    }
    let applied = match desc {
        UpgradeDescriptor::NewWeapon(kind) => acquire_weapon(world, res, cmds, player, *kind)?,
        UpgradeDescriptor::WeaponLevel(kind) => {
            owned_weapon(world, player, *kind).is_some() && acquire_weapon(world, res, cmds, player, *kind)?
        }
        UpgradeDescriptor::Passive(id) => apply_passive(world, res, cmds, player, id)?,
    };
    if applied {
        Ok(())
    } else {
        Err(SimError::InvalidUpgrade(desc.clone()))
    }
}

fn apply_passive(
    world: &World,
    res: &mut Resources,
    cmds: &mut CommandBuffer,
    player: EntityId,
    id: &str,
) -> Result<bool, SimError> {
    let def = res.prefabs.passive(id).ok_or_else(|| SimError::UnknownPrefab {
        category: "passive",
        key: id.to_owned(),
    })?;
    let reason = || CausalReason::rule("passive_upgrade");

    let level = match owned_passive(world, player, id) {
        None => {
            let Some(modifiers) = def.levels.first() else {
                return Ok(false);
            };
            let bundle = modifier_source_bundle(player, modifiers.clone()).with(PassiveItem {
                id: id.to_owned(),
                level: 0,
            });
            cmds.spawn(bundle, systems::UPGRADES, reason());
            0
        }
        Some((source, level)) => {
            let next = level + 1;
            let Some(modifiers) = def.levels.get(next) else {
                return Ok(false);
            };
            let modifiers: Buffer<StatModifier> = modifiers.iter().copied().collect();
            cmds.set_component(source, &modifiers, systems::UPGRADES, reason());
            cmds.set_component(
                source,
                &PassiveItem {
                    id: id.to_owned(),
                    level: next,
                },
                systems::UPGRADES,
                reason(),
            );
            cmds.set_enabled::<RecalculateStatsFlag>(player, true, systems::UPGRADES, reason());
            next
        }
    };
    tracing::debug!(player = ?player, passive = id, level, "passive applied");
    res.events.publish(SimEvent::PassiveAcquired {
        id: id.to_owned(),
        level,
    });
    Ok(true)
}
