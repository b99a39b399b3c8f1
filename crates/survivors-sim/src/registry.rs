//! Prefab registry: enemy, weapon and passive templates by key.
//!
//! Built once per session from [`GameConfig`]. A duplicate key is a content
//! error: registration returns [`SimError::DuplicatePrefab`], and
//! [`PrefabRegistry::from_config`] logs it and keeps the first definition.

use std::collections::BTreeMap;

use glam::Vec3;
use survivors_ecs::prelude::*;

use crate::components::{
    with_destroy_flags, Boss, ChasePlayer, CollisionRadius, ContactDamage, DamageTakenFlag,
    DamageThisFrame, Enemy, EnemyType, ExperienceDrop, Health, LocalTransform, Movement,
    MovementStart,
};
use crate::config::{BossDefinition, EnemyDefinition, GameConfig, PassiveDefinition, WeaponDefinition};
use crate::error::SimError;
use crate::interaction::EntityInteraction;
use crate::rng::EntityRng;
use crate::waves::FormationMotion;
use crate::weapons::WeaponKind;

/// Where and how a new enemy starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemySpawn {
    pub position: Vec3,
    pub motion: FormationMotion,
    /// Simulation time at spawn, for scripted movement.
    pub start_time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PrefabRegistry {
    enemies: BTreeMap<EnemyType, EnemyDefinition>,
    weapons: BTreeMap<WeaponKind, WeaponDefinition>,
    passives: BTreeMap<String, PassiveDefinition>,
}

impl PrefabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every template in `config`, skipping duplicates with a
    /// warning.
    pub fn from_config(config: &GameConfig) -> Self {
        let mut registry = Self::new();
        for def in &config.enemies {
            if let Err(e) = registry.register_enemy(def.clone()) {
                tracing::warn!(error = %e, "skipping enemy prefab");
            }
        }
        for def in &config.weapons {
            if let Err(e) = registry.register_weapon(def.clone()) {
                tracing::warn!(error = %e, "skipping weapon prefab");
            }
        }
        for def in &config.passives {
            if let Err(e) = registry.register_passive(def.clone()) {
                tracing::warn!(error = %e, "skipping passive prefab");
            }
        }
        registry
    }

    pub fn register_enemy(&mut self, def: EnemyDefinition) -> Result<(), SimError> {
        if self.enemies.contains_key(&def.id) {
            return Err(SimError::DuplicatePrefab {
                category: "enemy",
                key: def.id.0,
            });
        }
        self.enemies.insert(def.id.clone(), def);
        Ok(())
    }

    pub fn register_weapon(&mut self, def: WeaponDefinition) -> Result<(), SimError> {
        if self.weapons.contains_key(&def.kind) {
            return Err(SimError::DuplicatePrefab {
                category: "weapon",
                key: format!("{:?}", def.kind),
            });
        }
        self.weapons.insert(def.kind, def);
        Ok(())
    }

    pub fn register_passive(&mut self, def: PassiveDefinition) -> Result<(), SimError> {
        if self.passives.contains_key(&def.id) {
            return Err(SimError::DuplicatePrefab {
                category: "passive",
                key: def.id,
            });
        }
        self.passives.insert(def.id.clone(), def);
        Ok(())
    }

    pub fn enemy(&self, kind: &EnemyType) -> Option<&EnemyDefinition> {
        self.enemies.get(kind)
    }

    pub fn weapon(&self, kind: WeaponKind) -> Option<&WeaponDefinition> {
        self.weapons.get(&kind)
    }

    pub fn passive(&self, id: &str) -> Option<&PassiveDefinition> {
        self.passives.get(id)
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    /// Component bundle for a regular enemy, or `None` if `kind` is unknown.
    pub fn enemy_bundle(&self, kind: &EnemyType, spawn: &EnemySpawn, rng: EntityRng) -> Option<ComponentBundle> {
        let def = self.enemy(kind)?;
        Some(build_enemy(def, def.hp, spawn, rng).with(ExperienceDrop {
            amount: def.experience,
            chance: def.drop_chance,
        }))
    }

    /// Component bundle for a wave boss. Hit points are `base_hp * level`
    /// and the experience drop is guaranteed.
    pub fn boss_bundle(
        &self,
        boss: &BossDefinition,
        player_level: u32,
        spawn: &EnemySpawn,
        rng: EntityRng,
    ) -> Option<ComponentBundle> {
        let def = self.enemy(&boss.enemy_type)?;
        let level = i32::try_from(player_level.max(1)).unwrap_or(i32::MAX);
        let hp = boss.base_hp.saturating_mul(level);
        Some(
            build_enemy(def, hp, spawn, rng)
                .with(ExperienceDrop {
                    amount: boss.experience,
                    chance: 100.0,
                })
                .with(Boss {
                    bonus_crate_chance: boss.bonus_crate_chance,
                }),
        )
    }
}

fn build_enemy(def: &EnemyDefinition, hp: i32, spawn: &EnemySpawn, rng: EntityRng) -> ComponentBundle {
    let heading = match spawn.motion {
        FormationMotion::Linear { direction } | FormationMotion::Sine { direction, .. } => direction,
        FormationMotion::ChasePlayer => Vec3::X,
    };
    let bundle = ComponentBundle::new()
        .with(LocalTransform {
            position: spawn.position,
            heading,
        })
        .with(Enemy {
            kind: def.id.clone(),
        })
        .with(Health::full(hp))
        .with(Buffer::<DamageThisFrame>::new())
        .with_disabled(DamageTakenFlag)
        .with(CollisionRadius(def.collision_radius))
        .with(ContactDamage(def.contact_damage))
        .with(Buffer::<EntityInteraction>::new())
        .with(rng);
    let movement = match spawn.motion {
        FormationMotion::ChasePlayer => None,
        FormationMotion::Linear { direction } => Some(Movement::Linear {
            direction,
            speed: def.move_speed,
        }),
        FormationMotion::Sine {
            direction,
            amplitude,
            frequency,
        } => Some(Movement::Sine {
            direction,
            speed: def.move_speed,
            amplitude,
            frequency,
        }),
    };
    let bundle = match movement {
        Some(movement) => bundle.with(movement).with(MovementStart {
            origin: spawn.position,
            start_time: spawn.start_time,
        }),
        None => bundle.with(ChasePlayer {
            speed: def.move_speed,
        }),
    };
    with_destroy_flags(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BossDefinition, GameConfig};

    fn spawn() -> EnemySpawn {
        EnemySpawn {
            position: Vec3::new(12.0, 0.0, 0.0),
            motion: FormationMotion::ChasePlayer,
            start_time: 0.0,
        }
    }

    #[test]
    fn duplicate_registration_is_rejected_and_first_kept() {
        let mut config = GameConfig::default();
        let mut dup = config.enemies[0].clone();
        dup.hp = 9999;
        config.enemies.push(dup);

        let registry = PrefabRegistry::from_config(&config);
        let first = &config.enemies[0];
        assert_eq!(registry.enemy(&first.id).unwrap().hp, first.hp);
        assert_eq!(registry.enemy_count(), config.enemies.len() - 1);

        let mut direct = PrefabRegistry::new();
        direct.register_enemy(first.clone()).unwrap();
        assert!(matches!(
            direct.register_enemy(first.clone()),
            Err(SimError::DuplicatePrefab { category: "enemy", .. })
        ));
    }

    #[test]
    fn unknown_enemy_has_no_bundle() {
        let registry = PrefabRegistry::from_config(&GameConfig::default());
        assert!(registry
            .enemy_bundle(&EnemyType::new("ghost"), &spawn(), EntityRng::from_seed(0))
            .is_none());
    }

    #[test]
    fn boss_health_scales_with_player_level() {
        let registry = PrefabRegistry::from_config(&GameConfig::default());
        let boss = BossDefinition {
            enemy_type: EnemyType::new("reaper"),
            base_hp: 50,
            experience: 10,
            bonus_crate_chance: 0.0,
        };
        let mut world = World::new();
        crate::components::register_all(&mut world);
        let bundle = registry.boss_bundle(&boss, 4, &spawn(), EntityRng::from_seed(0)).unwrap();
        let e = world.spawn_bundle(bundle).unwrap();
        assert_eq!(world.get_cloned::<Health>(e), Some(Health { current: 200, base: 200 }));
        assert_eq!(world.get_cloned::<ExperienceDrop>(e).unwrap().chance, 100.0);
        assert!(world.has::<Boss>(e));
    }

    #[test]
    fn scripted_motion_replaces_chase() {
        let registry = PrefabRegistry::from_config(&GameConfig::default());
        let mut world = World::new();
        crate::components::register_all(&mut world);
        let spawn = EnemySpawn {
            motion: FormationMotion::Linear { direction: Vec3::NEG_X },
            ..spawn()
        };
        let bundle = registry
            .enemy_bundle(&EnemyType::new("bat"), &spawn, EntityRng::from_seed(0))
            .unwrap();
        let e = world.spawn_bundle(bundle).unwrap();
        assert!(world.has::<Movement>(e));
        assert!(!world.has::<ChasePlayer>(e));
    }
}
