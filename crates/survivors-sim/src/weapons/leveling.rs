//! Weapon acquisition and level-up.

use survivors_ecs::prelude::*;

use crate::error::SimError;
use crate::events::SimEvent;
use crate::resources::Resources;
use crate::rng::EntityRng;
use crate::systems;

use super::{Weapon, WeaponActive, WeaponKind, WeaponState};

/// Cooldown forced on an upgraded weapon so it fires almost immediately.
pub const UPGRADE_COOLDOWN: f32 = 0.01;

/// The weapon entity of `kind` owned by `owner`, if any.
pub fn owned_weapon(world: &World, owner: EntityId, kind: WeaponKind) -> Option<EntityId> {
    let weapons = world.read::<Weapon>();
    let found = weapons
        .iter()
        .find(|(e, w)| w.owner == owner && w.kind == kind && world.is_alive(*e))
        .map(|(e, _)| e);
    found
}

/// Give `owner` a weapon of `kind` at level 0, or upgrade the one it has.
///
/// Returns `Ok(false)` if the owned weapon is already at its last level.
pub fn acquire_weapon(
    world: &World,
    res: &mut Resources,
    cmds: &mut CommandBuffer,
    owner: EntityId,
    kind: WeaponKind,
) -> Result<bool, SimError> {
    if res.prefabs.weapon(kind).is_none() {
        return Err(SimError::UnknownPrefab {
            category: "weapon",
            key: format!("{kind:?}"),
        });
    }
    if let Some(weapon) = owned_weapon(world, owner, kind) {
        return upgrade_weapon(world, res, weapon);
    }
    let bundle = ComponentBundle::new()
        .with(Weapon { kind, owner })
        .with(WeaponState::fresh())
        .with_disabled(WeaponActive)
        .with(EntityRng::from_seeder(&mut res.seeder));
    cmds.spawn(bundle, systems::UPGRADES, CausalReason::rule("acquire_weapon"));
    tracing::debug!(owner = ?owner, ?kind, "weapon acquired");
    res.events.publish(SimEvent::WeaponAcquired { kind });
    Ok(true)
}

/// Advance `weapon` one level and force it back into a near-zero cooldown.
///
/// Returns `Ok(false)` if it is already at its last level.
pub fn upgrade_weapon(world: &World, res: &mut Resources, weapon: EntityId) -> Result<bool, SimError> {
    let kind = world
        .get::<Weapon>(weapon)
        .map(|w| w.kind)
        .ok_or(SimError::Ecs(EcsError::StaleEntity { entity: weapon }))?;
    let max = res
        .prefabs
        .weapon(kind)
        .map(|d| d.max_level_index())
        .ok_or_else(|| SimError::UnknownPrefab {
            category: "weapon",
            key: format!("{kind:?}"),
        })?;

    let level = {
        let mut states = world.write::<WeaponState>();
        let Some(state) = states.get_mut(weapon) else {
            return Err(SimError::Ecs(EcsError::MissingComponent {
                entity: weapon,
                component: "weapon_state".to_owned(),
            }));
        };
        let current = usize::try_from(state.level_index).unwrap_or(0);
        if current >= max {
            return Ok(false);
        }
        state.level_index += 1;
        state.attack_count = 0;
        state.next_attack_timer = 0.0;
        state.cooldown_timer = UPGRADE_COOLDOWN;
        current + 1
    };
    world.set_enabled::<WeaponActive>(weapon, false);

    tracing::debug!(weapon = ?weapon, ?kind, level, "weapon upgraded");
    res.events.publish(SimEvent::WeaponUpgraded { kind, level });
    Ok(true)
}
