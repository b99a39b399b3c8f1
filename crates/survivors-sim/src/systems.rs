//! System identities and the default pipeline.
//!
//! Every command a system queues is tagged with one of the [`SystemId`]s
//! below so the apply log can say who asked for a change. Ids that no
//! scheduled system owns (`SETUP`, `UPGRADES`) tag host-driven changes.

use survivors_ecs::prelude::SystemId;

use crate::collision::detect_overlaps;
use crate::damage::{apply_contact_damage, clear_damage_flags, regenerate, resolve_damage, tick_invincibility};
use crate::destruction::{destroy_flagged, emit_destroy_effects, expire_lifetimes};
use crate::experience::{apply_experience, collect_pickups};
use crate::interaction::{
    apply_attack_hits, compact_interactions, mark_interactions_handled, raise_interactions, refresh_auras,
};
use crate::movement::{apply_movement, chase_player, follow_owner, move_player, update_camera};
use crate::schedule::{Phase, Schedule};
use crate::stats::{link_modifier_sources, recalculate_flagged_stats};
use crate::waves::{advance_waves, spawn_scheduled_events, top_up_population};
use crate::weapons::weapon_attacks;

/// Session setup in `Simulation::new`.
pub const SETUP: SystemId = SystemId(0);
pub const ADVANCE_WAVES: SystemId = SystemId(1);
pub const SPAWN_EVENTS: SystemId = SystemId(2);
pub const TOP_UP: SystemId = SystemId(3);
pub const LINK_MODIFIERS: SystemId = SystemId(4);
pub const WEAPON_ATTACKS: SystemId = SystemId(10);
pub const EXPIRE_LIFETIMES: SystemId = SystemId(11);
pub const COLLECT_PICKUPS: SystemId = SystemId(20);
pub const DESTROY: SystemId = SystemId(30);
/// Weapon and passive upgrades, whether chosen by the host or granted by a
/// bonus crate.
pub const UPGRADES: SystemId = SystemId(40);

/// The full gameplay pipeline, in execution order.
pub fn default_schedule() -> Schedule {
    let mut s = Schedule::new();

    s.add_system(Phase::Initialization, "advance_waves", advance_waves);
    s.add_system_after(
        Phase::Initialization,
        "spawn_scheduled_events",
        &["advance_waves"],
        spawn_scheduled_events,
    );
    s.add_system_after(
        Phase::Initialization,
        "top_up_population",
        &["spawn_scheduled_events"],
        top_up_population,
    );
    s.add_system(Phase::Initialization, "link_modifier_sources", link_modifier_sources);

    s.add_system(Phase::Simulation, "clear_damage_flags", clear_damage_flags);
    s.add_system(Phase::Simulation, "tick_invincibility", tick_invincibility);
    s.add_system(Phase::Simulation, "move_player", move_player);
    s.add_system_after(Phase::Simulation, "update_camera", &["move_player"], update_camera);
    s.add_system_after(Phase::Simulation, "chase_player", &["move_player"], chase_player);
    s.add_system(Phase::Simulation, "apply_movement", apply_movement);
    s.add_system_after(Phase::Simulation, "follow_owner", &["move_player"], follow_owner);
    s.add_system_after(Phase::Simulation, "weapon_attacks", &["update_camera"], weapon_attacks);
    s.add_system(Phase::Simulation, "expire_lifetimes", expire_lifetimes);
    s.add_system(Phase::Simulation, "refresh_auras", refresh_auras);
    s.add_system(Phase::Simulation, "regenerate", regenerate);

    s.add_system(Phase::Interaction, "detect_overlaps", detect_overlaps);
    s.add_system_after(Phase::Interaction, "raise_interactions", &["detect_overlaps"], raise_interactions);
    s.add_system_after(Phase::Interaction, "apply_attack_hits", &["raise_interactions"], apply_attack_hits);
    s.add_system_after(
        Phase::Interaction,
        "apply_contact_damage",
        &["raise_interactions"],
        apply_contact_damage,
    );
    s.add_system_after(Phase::Interaction, "collect_pickups", &["raise_interactions"], collect_pickups);
    s.add_system_after(
        Phase::Interaction,
        "mark_interactions_handled",
        &["apply_attack_hits", "apply_contact_damage", "collect_pickups"],
        mark_interactions_handled,
    );
    s.add_system_after(
        Phase::Interaction,
        "compact_interactions",
        &["mark_interactions_handled"],
        compact_interactions,
    );

    s.add_system(Phase::Resolution, "resolve_damage", resolve_damage);
    s.add_system(Phase::Resolution, "recalculate_flagged_stats", recalculate_flagged_stats);
    s.add_system(Phase::Resolution, "apply_experience", apply_experience);
    s.add_system_after(
        Phase::Resolution,
        "emit_destroy_effects",
        &["resolve_damage"],
        emit_destroy_effects,
    );
    s.add_system_after(
        Phase::Resolution,
        "destroy_flagged",
        &["emit_destroy_effects"],
        destroy_flagged,
    );
    s
}
