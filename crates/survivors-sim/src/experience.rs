//! Pickups, experience and level-ups.

use survivors_ecs::prelude::*;

use crate::components::{Pickup, PickupKind, Player, PlayerExperience};
use crate::events::SimEvent;
use crate::interaction::{for_each_unhandled, EntityInteraction};
use crate::resources::{find_player, Resources};
use crate::rng::EntityRng;
use crate::stats::{stats_of, StatKind};
use crate::systems;
use crate::upgrades::{apply_upgrade, roll_choices};

/// Experience state for a fresh level-1 character.
pub fn starting_experience(res: &Resources) -> PlayerExperience {
    PlayerExperience {
        level: 1,
        current: 0.0,
        to_next: res.config.experience.threshold(1),
        pending: 0.0,
    }
}

/// Run `f` with the player's generator, writing it back afterwards. Falls
/// back to a fresh seeder stream if the player has none.
fn with_player_rng<R>(
    world: &World,
    res: &mut Resources,
    player: EntityId,
    f: impl FnOnce(&mut Resources, &mut EntityRng) -> R,
) -> R {
    let mut rng = world
        .get_cloned::<EntityRng>(player)
        .unwrap_or_else(|| EntityRng::from_seeder(&mut res.seeder));
    let out = f(res, &mut rng);
    if let Some(slot) = world.write::<EntityRng>().get_mut(player) {
        *slot = rng;
    }
    out
}

/// Collect every pickup that touched the player this frame.
///
/// Experience orbs add to the player's pending experience. A bonus crate
/// rolls one applicable upgrade and applies it on the spot.
pub fn collect_pickups(world: &World, res: &mut Resources, cmds: &mut CommandBuffer) {
    let Some(player) = find_player(world) else {
        return;
    };
    let mut collected: Vec<(EntityId, PickupKind)> = Vec::new();
    {
        let pickups = world.read::<Pickup>();
        let buffers = world.read::<Buffer<EntityInteraction>>();
        for (entity, pickup) in pickups.iter() {
            let Some(buffer) = buffers.get(entity) else {
                continue;
            };
            let mut touched = false;
            for_each_unhandled(buffer, |target| touched |= world.has::<Player>(target));
            if touched {
                collected.push((entity, pickup.kind));
            }
        }
    }

    for (pickup, kind) in collected {
        match kind {
            PickupKind::Experience(amount) => {
                if let Some(xp) = world.write::<PlayerExperience>().get_mut(player) {
                    xp.pending += amount as f32;
                }
            }
            PickupKind::BonusCrate => open_crate(world, res, cmds, player),
        }
        cmds.despawn(pickup, systems::COLLECT_PICKUPS, CausalReason::rule("pickup_collected"));
    }
}

fn open_crate(world: &World, res: &mut Resources, cmds: &mut CommandBuffer, player: EntityId) {
    let choice = with_player_rng(world, res, player, |res, rng| {
        roll_choices(world, res, player, 1, rng).into_iter().next()
    });
    let Some(upgrade) = choice else {
        tracing::debug!("bonus crate had nothing applicable");
        return;
    };
    match apply_upgrade(world, res, cmds, player, &upgrade) {
        Ok(()) => res.events.publish(SimEvent::CrateOpened { upgrade }),
        Err(e) => tracing::warn!(error = %e, "bonus crate upgrade failed"),
    }
}

/// Fold pending experience into the player's total and roll level-ups.
///
/// Gains are scaled by the `ExperienceGain` stat. Every level crossed queues
/// one set of upgrade choices for the host.
pub fn apply_experience(world: &World, res: &mut Resources, _cmds: &mut CommandBuffer) {
    let Some(player) = find_player(world) else {
        return;
    };
    let gain = stats_of(world, player).get(StatKind::ExperienceGain);
    let mut reached: Vec<u32> = Vec::new();
    {
        let mut xps = world.write::<PlayerExperience>();
        let Some(xp) = xps.get_mut(player) else {
            return;
        };
        if xp.pending <= 0.0 {
            return;
        }
        xp.current += xp.pending * gain;
        xp.pending = 0.0;
        while xp.to_next > 0.0 && xp.current >= xp.to_next {
            xp.current -= xp.to_next;
            xp.level += 1;
            xp.to_next = res.config.experience.threshold(xp.level);
            reached.push(xp.level);
        }
    }

    let count = res.config.level_up_choices;
    for level in reached {
        let choices = with_player_rng(world, res, player, |res, rng| roll_choices(world, res, player, count, rng));
        tracing::debug!(level, choices = choices.len(), "level up");
        res.pending_level_ups.push_back(choices.clone());
        res.events.publish(SimEvent::LevelUp { level, choices });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_all;
    use crate::destruction::pickup_bundle;
    use crate::stats::{ActiveStatModifierEntity, CharacterStatModificationState, StatModifier};
    use glam::Vec3;

    fn player(world: &mut World, res: &Resources) -> EntityId {
        world
            .spawn_bundle(
                ComponentBundle::new()
                    .with(Player)
                    .with(starting_experience(res))
                    .with(Buffer::<ActiveStatModifierEntity>::new())
                    .with(CharacterStatModificationState::template())
                    .with(EntityRng::from_seed(3)),
            )
            .unwrap()
    }

    fn touched_pickup(world: &mut World, kind: PickupKind, player: EntityId) -> EntityId {
        let pickup = world.spawn_bundle(pickup_bundle(kind, Vec3::ZERO)).unwrap();
        world.append(
            pickup,
            EntityInteraction {
                handled: false,
                target: player,
            },
        );
        pickup
    }

    #[test]
    fn orbs_add_pending_experience_and_despawn() {
        let mut world = World::new();
        register_all(&mut world);
        let mut res = Resources::for_tests();
        let p = player(&mut world, &res);
        let a = touched_pickup(&mut world, PickupKind::Experience(2), p);
        let b = touched_pickup(&mut world, PickupKind::Experience(1), p);

        let mut cmds = CommandBuffer::new();
        collect_pickups(&world, &mut res, &mut cmds);
        cmds.apply(&mut world);
        assert_eq!(world.get_cloned::<PlayerExperience>(p).unwrap().pending, 3.0);
        assert!(!world.is_alive(a));
        assert!(!world.is_alive(b));
    }

    #[test]
    fn crossing_several_thresholds_queues_each_level() {
        let mut world = World::new();
        register_all(&mut world);
        let mut res = Resources::for_tests();
        let p = player(&mut world, &res);
        // Default curve: 5 to reach level 2, 15 more to reach level 3.
        world.write::<PlayerExperience>().get_mut(p).unwrap().pending = 21.0;
        apply_experience(&world, &mut res, &mut CommandBuffer::new());

        let xp = world.get_cloned::<PlayerExperience>(p).unwrap();
        assert_eq!(xp.level, 3);
        assert_eq!(xp.current, 1.0);
        assert_eq!(xp.to_next, res.config.experience.threshold(3));
        assert_eq!(res.pending_level_ups.len(), 2);
        let levels: Vec<u32> = res
            .events
            .events()
            .iter()
            .filter_map(|e| match e {
                SimEvent::LevelUp { level, .. } => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![2, 3]);
    }

    #[test]
    fn experience_gain_stat_scales_pickups() {
        let mut world = World::new();
        register_all(&mut world);
        let mut res = Resources::for_tests();
        let p = player(&mut world, &res);
        world
            .insert(
                p,
                CharacterStatModificationState::aggregate(&[StatModifier::new(StatKind::ExperienceGain, 1.0)]),
            )
            .unwrap();
        world.write::<PlayerExperience>().get_mut(p).unwrap().pending = 2.0;
        apply_experience(&world, &mut res, &mut CommandBuffer::new());
        assert_eq!(world.get_cloned::<PlayerExperience>(p).unwrap().current, 4.0);
        assert!(res.pending_level_ups.is_empty());
    }

    #[test]
    fn bonus_crate_applies_an_upgrade() {
        let mut world = World::new();
        register_all(&mut world);
        let mut res = Resources::for_tests();
        let p = player(&mut world, &res);
        touched_pickup(&mut world, PickupKind::BonusCrate, p);

        let mut cmds = CommandBuffer::new();
        collect_pickups(&world, &mut res, &mut cmds);
        assert!(res
            .events
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::CrateOpened { .. })));
        cmds.apply(&mut world);
        assert_eq!(Query::new().with_present::<Pickup>().count(&world), 0);
    }
}
