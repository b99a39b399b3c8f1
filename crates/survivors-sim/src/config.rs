//! Game content and session configuration.
//!
//! [`GameConfig`] is the process-wide content table: player, enemy and weapon
//! templates, passive items, wave definitions, and the tuning for the spawner,
//! experience curve and upgrade rarity table. It is loaded once per session
//! (from JSON or [`GameConfig::default`]), validated, and shared read-only
//! with every system through `Resources`.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::components::EnemyType;
use crate::error::SimError;
use crate::stats::{StatKind, StatModifier};
use crate::upgrades::{RarityTable, RarityTier, UpgradeDescriptor};
use crate::waves::{SpawnFormation, MAX_FORMATION_SPAWNS};
use crate::weapons::WeaponKind;

// ---------------------------------------------------------------------------
// Player / enemies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDefinition {
    pub base_hp: i32,
    pub move_speed: f32,
    pub collision_radius: f32,
    pub pickup_radius: f32,
    /// Seconds of invincibility after taking damage.
    pub invincibility_window: f32,
    pub starting_weapon: WeaponKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyDefinition {
    pub id: EnemyType,
    pub hp: i32,
    pub move_speed: f32,
    pub contact_damage: i32,
    pub collision_radius: f32,
    pub experience: u32,
    /// Percentage chance to drop an experience orb.
    #[serde(default = "always")]
    pub drop_chance: f32,
}

fn always() -> f32 {
    100.0
}

// ---------------------------------------------------------------------------
// Weapons / passives
// ---------------------------------------------------------------------------

/// Parameters for one weapon level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponLevel {
    pub damage: i32,
    /// Seconds between attack groups.
    pub cooldown: f32,
    /// Attacks per group before the weapon re-arms.
    pub attack_count: i32,
    /// Seconds between attacks within a group.
    pub attack_interval: f32,
    /// Attack lifetime in seconds.
    pub duration: f32,
    pub speed: f32,
    /// Collision radius of each attack.
    pub area: f32,
    #[serde(default)]
    pub hit_limit: Option<u32>,
    /// Seconds after which an attack may hit the same target again.
    #[serde(default)]
    pub rehit_interval: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponDefinition {
    pub kind: WeaponKind,
    /// Precomputed level table, index 0 is the level on acquisition.
    pub levels: Vec<WeaponLevel>,
}

impl WeaponDefinition {
    /// Parameters for `level_index`, clamped to the table.
    pub fn level(&self, level_index: i32) -> Option<&WeaponLevel> {
        let last = self.levels.len().checked_sub(1)?;
        let idx = usize::try_from(level_index.max(0)).unwrap_or(0).min(last);
        self.levels.get(idx)
    }

    pub fn max_level_index(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}

/// A passive item. Each level lists the complete modifier set at that level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveDefinition {
    pub id: String,
    pub levels: Vec<Vec<StatModifier>>,
}

// ---------------------------------------------------------------------------
// Waves / spawner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEventDefinition {
    /// Seconds after the wave starts.
    pub delay: f32,
    /// Percentage chance that the event spawns anything.
    pub chance: f32,
    pub formation: SpawnFormation,
    pub enemy_type: EnemyType,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossDefinition {
    pub enemy_type: EnemyType,
    /// Scaled by the player's level at spawn time.
    pub base_hp: i32,
    pub experience: u32,
    /// Percentage chance to drop a bonus crate.
    pub bonus_crate_chance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveDefinition {
    /// Ambient roster for the population top-up.
    pub enemy_types: Vec<EnemyType>,
    pub min_enemy_count: u32,
    /// Seconds between population top-ups.
    pub spawn_interval: f32,
    #[serde(default)]
    pub spawn_events: Vec<SpawnEventDefinition>,
    #[serde(default)]
    pub boss: Option<BossDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerSettings {
    /// Seconds per wave.
    pub wave_interval: f32,
    /// Band beyond the camera half-extents in which enemies appear.
    pub min_offscreen: f32,
    pub max_offscreen: f32,
}

// ---------------------------------------------------------------------------
// Progression
// ---------------------------------------------------------------------------

/// Experience needed to advance from `level` to `level + 1` is
/// `base + increment * (level - 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceCurve {
    pub base: f32,
    pub increment: f32,
}

impl ExperienceCurve {
    pub fn threshold(&self, level: u32) -> f32 {
        self.base + self.increment * level.saturating_sub(1) as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSettings {
    /// Ticks between interaction buffer compactions. 0 disables compaction.
    pub compaction_interval_ticks: u64,
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub player: PlayerDefinition,
    pub enemies: Vec<EnemyDefinition>,
    pub weapons: Vec<WeaponDefinition>,
    pub passives: Vec<PassiveDefinition>,
    pub waves: Vec<WaveDefinition>,
    pub spawner: SpawnerSettings,
    pub experience: ExperienceCurve,
    pub rarity: RarityTable,
    pub interactions: InteractionSettings,
    pub camera_half_extents: Vec3,
    /// Upgrade options offered per level-up.
    pub level_up_choices: usize,
}

impl GameConfig {
    /// Parse and validate a JSON content file.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject structurally invalid content.
    ///
    /// Duplicate enemy or weapon ids are not an error here; the prefab
    /// registry logs and skips them.
    pub fn validate(&self) -> Result<(), SimError> {
        fn invalid(msg: impl Into<String>) -> Result<(), SimError> {
            Err(SimError::Config(msg.into()))
        }
        fn positive(v: f32) -> bool {
            v > 0.0 && v.is_finite()
        }

        if self.player.base_hp <= 0 {
            return invalid("player.base_hp must be positive");
        }
        if !self.weapons.iter().any(|w| w.kind == self.player.starting_weapon) {
            return invalid(format!(
                "starting weapon {:?} has no definition",
                self.player.starting_weapon
            ));
        }
        for weapon in &self.weapons {
            if weapon.levels.is_empty() {
                return invalid(format!("weapon {:?} has an empty level table", weapon.kind));
            }
            for level in &weapon.levels {
                if !positive(level.cooldown) || level.attack_interval < 0.0 || level.attack_count < 1 {
                    return invalid(format!(
                        "weapon {:?} has a level with non-positive cooldown or attack count",
                        weapon.kind
                    ));
                }
            }
        }
        for passive in &self.passives {
            if passive.levels.is_empty() {
                return invalid(format!("passive '{}' has no levels", passive.id));
            }
        }
        if self.waves.is_empty() {
            return invalid("at least one wave is required");
        }
        let known = |ty: &EnemyType| self.enemies.iter().any(|e| &e.id == ty);
        for (index, wave) in self.waves.iter().enumerate() {
            if !positive(wave.spawn_interval) {
                return invalid(format!("wave {index} spawn_interval must be positive"));
            }
            if let Some(ty) = wave.enemy_types.iter().find(|t| !known(t)) {
                return invalid(format!("wave {index} references unknown enemy '{ty}'"));
            }
            for event in &wave.spawn_events {
                if event.formation.spawn_count(event.count) > MAX_FORMATION_SPAWNS {
                    return invalid(format!(
                        "wave {index} has a spawn event placing more than {MAX_FORMATION_SPAWNS} enemies"
                    ));
                }
            }
            if let Some(boss) = &wave.boss {
                if !known(&boss.enemy_type) {
                    return invalid(format!(
                        "wave {index} boss references unknown enemy '{}'",
                        boss.enemy_type
                    ));
                }
            }
        }
        if !positive(self.spawner.wave_interval) {
            return invalid("spawner.wave_interval must be positive");
        }
        if self.spawner.min_offscreen < 0.0 || self.spawner.min_offscreen > self.spawner.max_offscreen
        {
            return invalid("spawner offscreen band requires 0 <= min <= max");
        }
        if !positive(self.experience.base) || self.experience.increment < 0.0 {
            return invalid("experience curve must have a positive base");
        }
        if self.level_up_choices == 0 {
            return invalid("level_up_choices must be at least 1");
        }
        Ok(())
    }

    pub fn weapon(&self, kind: WeaponKind) -> Option<&WeaponDefinition> {
        self.weapons.iter().find(|w| w.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// Built-in content
// ---------------------------------------------------------------------------

fn enemy(id: &str, hp: i32, move_speed: f32, contact_damage: i32, radius: f32, xp: u32) -> EnemyDefinition {
    EnemyDefinition {
        id: EnemyType::new(id),
        hp,
        move_speed,
        contact_damage,
        collision_radius: radius,
        experience: xp,
        drop_chance: 100.0,
    }
}

/// Build a level table from a base level, applying `grow` once per level.
fn leveled(base: WeaponLevel, levels: usize, grow: impl Fn(&mut WeaponLevel, usize)) -> Vec<WeaponLevel> {
    let mut table = Vec::with_capacity(levels);
    let mut current = base;
    for i in 0..levels {
        if i > 0 {
            grow(&mut current, i);
        }
        table.push(current.clone());
    }
    table
}

fn default_weapons() -> Vec<WeaponDefinition> {
    let base = |damage, cooldown, attack_count, duration, speed, area| WeaponLevel {
        damage,
        cooldown,
        attack_count,
        attack_interval: 0.1,
        duration,
        speed,
        area,
        hit_limit: Some(1),
        rehit_interval: None,
    };
    vec![
        WeaponDefinition {
            kind: WeaponKind::MagicWand,
            levels: leveled(base(10, 1.2, 1, 3.0, 10.0, 0.3), 8, |l, i| {
                if i % 2 == 1 {
                    l.attack_count += 1;
                } else {
                    l.damage += 10;
                }
            }),
        },
        WeaponDefinition {
            kind: WeaponKind::Knife,
            levels: leveled(base(6, 1.0, 1, 2.0, 14.0, 0.2), 8, |l, i| {
                l.attack_count += 1;
                if i % 3 == 0 {
                    l.damage += 5;
                }
            }),
        },
        WeaponDefinition {
            kind: WeaponKind::Axe,
            levels: leveled(
                WeaponLevel {
                    hit_limit: Some(3),
                    ..base(20, 4.0, 1, 3.0, 12.0, 0.5)
                },
                8,
                |l, i| {
                    if i % 2 == 1 {
                        l.attack_count += 1;
                    } else {
                        l.damage += 20;
                        l.hit_limit = l.hit_limit.map(|h| h + 2);
                    }
                },
            ),
        },
        WeaponDefinition {
            kind: WeaponKind::Cross,
            levels: leveled(
                WeaponLevel {
                    hit_limit: None,
                    ..base(10, 2.0, 1, 2.0, 8.0, 0.4)
                },
                8,
                |l, i| {
                    if i % 2 == 1 {
                        l.damage += 10;
                    } else {
                        l.attack_count += 1;
                    }
                },
            ),
        },
        WeaponDefinition {
            kind: WeaponKind::LightningRing,
            levels: leveled(
                WeaponLevel {
                    hit_limit: None,
                    attack_interval: 0.05,
                    ..base(15, 4.5, 2, 0.2, 0.0, 1.0)
                },
                8,
                |l, i| {
                    l.attack_count += 1;
                    if i % 2 == 0 {
                        l.damage += 10;
                        l.area += 0.25;
                    }
                },
            ),
        },
        WeaponDefinition {
            kind: WeaponKind::Garlic,
            levels: leveled(
                WeaponLevel {
                    hit_limit: None,
                    rehit_interval: Some(0.75),
                    ..base(5, 6.0, 1, 6.0, 0.0, 1.5)
                },
                8,
                |l, _| {
                    l.damage += 2;
                    l.area += 0.2;
                },
            ),
        },
    ]
}

fn passive(id: &str, kind: StatKind, per_level: f32, levels: usize) -> PassiveDefinition {
    PassiveDefinition {
        id: id.to_owned(),
        levels: (1..=levels)
            .map(|l| vec![StatModifier::new(kind, per_level * l as f32)])
            .collect(),
    }
}

fn default_passives() -> Vec<PassiveDefinition> {
    vec![
        passive("spinach", StatKind::Damage, 0.1, 5),
        passive("armor", StatKind::DamageReduction, 1.0, 5),
        passive("hollow_heart", StatKind::MaxHitPoints, 20.0, 5),
        passive("empty_tome", StatKind::Cooldown, -0.08, 5),
        passive("duplicator", StatKind::AttackCount, 1.0, 2),
        passive("wings", StatKind::MoveSpeed, 0.1, 5),
        passive("candelabrador", StatKind::Area, 0.1, 5),
        passive("bracer", StatKind::ProjectileSpeed, 0.1, 5),
        passive("spellbinder", StatKind::Duration, 0.1, 5),
        passive("attractorb", StatKind::PickupRadius, 0.5, 5),
        passive("crown", StatKind::ExperienceGain, 0.08, 5),
        passive("pummarola", StatKind::Recovery, 0.2, 5),
    ]
}

fn default_waves() -> Vec<WaveDefinition> {
    let roster = |names: &[&str]| names.iter().map(|n| EnemyType::new(*n)).collect::<Vec<_>>();
    vec![
        WaveDefinition {
            enemy_types: roster(&["bat"]),
            min_enemy_count: 15,
            spawn_interval: 1.0,
            spawn_events: vec![SpawnEventDefinition {
                delay: 30.0,
                chance: 100.0,
                formation: SpawnFormation::EllipseAroundCamera { margin: 2.0 },
                enemy_type: EnemyType::new("bat"),
                count: 24,
            }],
            boss: None,
        },
        WaveDefinition {
            enemy_types: roster(&["bat", "zombie"]),
            min_enemy_count: 30,
            spawn_interval: 1.0,
            spawn_events: vec![SpawnEventDefinition {
                delay: 20.0,
                chance: 75.0,
                formation: SpawnFormation::GridGroup {
                    rows: 3,
                    columns: 4,
                    spacing: 1.0,
                },
                enemy_type: EnemyType::new("zombie"),
                count: 12,
            }],
            boss: Some(BossDefinition {
                enemy_type: EnemyType::new("reaper"),
                base_hp: 50,
                experience: 25,
                bonus_crate_chance: 50.0,
            }),
        },
        WaveDefinition {
            enemy_types: roster(&["zombie", "skeleton"]),
            min_enemy_count: 45,
            spawn_interval: 0.8,
            spawn_events: vec![
                SpawnEventDefinition {
                    delay: 10.0,
                    chance: 100.0,
                    formation: SpawnFormation::SineWaveVertical {
                        amplitude: 1.5,
                        frequency: 0.5,
                    },
                    enemy_type: EnemyType::new("bat"),
                    count: 16,
                },
                SpawnEventDefinition {
                    delay: 40.0,
                    chance: 100.0,
                    formation: SpawnFormation::SineWaveHorizontal {
                        amplitude: 1.5,
                        frequency: 0.5,
                    },
                    enemy_type: EnemyType::new("bat"),
                    count: 16,
                },
            ],
            boss: Some(BossDefinition {
                enemy_type: EnemyType::new("reaper"),
                base_hp: 80,
                experience: 40,
                bonus_crate_chance: 100.0,
            }),
        },
    ]
}

fn default_rarity() -> RarityTable {
    let weapons = [
        WeaponKind::MagicWand,
        WeaponKind::Knife,
        WeaponKind::Axe,
        WeaponKind::Cross,
        WeaponKind::LightningRing,
        WeaponKind::Garlic,
    ];
    let passives = default_passives();
    RarityTable {
        tiers: vec![
            RarityTier {
                name: "common".to_owned(),
                weight: 60,
                upgrades: weapons.iter().map(|k| UpgradeDescriptor::WeaponLevel(*k)).collect(),
            },
            RarityTier {
                name: "uncommon".to_owned(),
                weight: 30,
                upgrades: passives
                    .iter()
                    .map(|p| UpgradeDescriptor::Passive(p.id.clone()))
                    .collect(),
            },
            RarityTier {
                name: "rare".to_owned(),
                weight: 10,
                upgrades: weapons.iter().map(|k| UpgradeDescriptor::NewWeapon(*k)).collect(),
            },
        ],
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player: PlayerDefinition {
                base_hp: 100,
                move_speed: 5.0,
                collision_radius: 0.5,
                pickup_radius: 1.5,
                invincibility_window: 0.5,
                starting_weapon: WeaponKind::MagicWand,
            },
            enemies: vec![
                enemy("bat", 10, 2.5, 5, 0.4, 1),
                enemy("zombie", 25, 1.5, 10, 0.5, 2),
                enemy("skeleton", 40, 2.0, 12, 0.5, 3),
                enemy("reaper", 50, 1.8, 25, 1.0, 20),
            ],
            weapons: default_weapons(),
            passives: default_passives(),
            waves: default_waves(),
            spawner: SpawnerSettings {
                wave_interval: 60.0,
                min_offscreen: 2.0,
                max_offscreen: 5.0,
            },
            experience: ExperienceCurve {
                base: 5.0,
                increment: 10.0,
            },
            rarity: default_rarity(),
            interactions: InteractionSettings {
                compaction_interval_ticks: 60,
            },
            camera_half_extents: Vec3::new(10.0, 5.0, 10.0),
            level_up_choices: 3,
        }
    }
}
