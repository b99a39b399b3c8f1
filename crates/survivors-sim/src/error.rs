//! Error type for the simulation crate.
//!
//! Systems never return errors: they skip, default or prune and log at the
//! point of detection. [`SimError`] is only returned by setup and by the
//! public entry points that act on behalf of an external caller (config
//! loading, prefab registration, applying a chosen upgrade).

use survivors_ecs::EcsError;

use crate::upgrades::UpgradeDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// Structurally invalid game content.
    #[error("invalid game config: {0}")]
    Config(String),

    #[error("failed to parse game config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A prefab with this key is already registered.
    #[error("duplicate {category} prefab '{key}'")]
    DuplicatePrefab { category: &'static str, key: String },

    #[error("no {category} prefab registered for '{key}'")]
    UnknownPrefab { category: &'static str, key: String },

    /// A context entity the operation depends on is absent.
    #[error("required entity '{0}' is missing")]
    MissingSingleton(&'static str),

    /// A rarity tier was chosen but holds no upgrades.
    #[error("rarity tier '{tier}' has no upgrades")]
    EmptyRarityTier { tier: String },

    #[error("upgrade {0:?} cannot be applied")]
    InvalidUpgrade(UpgradeDescriptor),

    /// The host picked a level-up choice that is not on offer.
    #[error("no pending level-up choice at index {0}")]
    NoPendingChoice(usize),
}
