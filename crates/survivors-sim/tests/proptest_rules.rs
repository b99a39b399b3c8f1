//! Property tests for the order-independent gameplay rules: damage frame
//! folding, stat aggregation and interaction deduplication.

use proptest::prelude::*;
use survivors_sim::components::DamageThisFrame;
use survivors_sim::damage::resolve_frame;
use survivors_sim::interaction::{raise_interaction, DedupPolicy, EntityInteraction};
use survivors_sim::prelude::EntityId;
use survivors_sim::stats::{CharacterStatModificationState, StatKind, StatModifier};

fn damage_entries() -> impl Strategy<Value = Vec<DamageThisFrame>> {
    prop::collection::vec((-500i32..500).prop_map(DamageThisFrame), 0..24)
}

// Quarter steps keep every partial sum exact in f32.
fn modifier_strategy() -> impl Strategy<Value = StatModifier> {
    (0..StatKind::ALL.len(), -40i32..40)
        .prop_map(|(k, quarters)| StatModifier::new(StatKind::ALL[k], quarters as f32 * 0.25))
}

proptest! {
    // -- Damage ----------------------------------------------------------

    #[test]
    fn damage_frame_ignores_entry_order(
        current in 0i32..500,
        max in 1i32..500,
        reduction in 0i32..20,
        invincible in any::<bool>(),
        entries in damage_entries(),
    ) {
        let mut reversed = entries.clone();
        reversed.reverse();
        let mut sorted = entries.clone();
        sorted.sort_by_key(|e| e.0);

        let a = resolve_frame(current, max, reduction, &entries, invincible);
        prop_assert_eq!(a, resolve_frame(current, max, reduction, &reversed, invincible));
        prop_assert_eq!(a, resolve_frame(current, max, reduction, &sorted, invincible));
    }

    #[test]
    fn damage_frame_stays_within_bounds(
        current in 0i32..500,
        max in 1i32..500,
        reduction in 0i32..20,
        invincible in any::<bool>(),
        entries in damage_entries(),
    ) {
        let out = resolve_frame(current.min(max), max, reduction, &entries, invincible);
        prop_assert!(out.hp >= 0 && out.hp <= max);
        prop_assert_eq!(out.died, out.hp == 0);
        prop_assert!(out.damage >= 0);
        if invincible {
            prop_assert_eq!(out.damage, 0);
        }
    }

    // -- Stats -----------------------------------------------------------

    #[test]
    fn aggregation_ignores_modifier_order(mods in prop::collection::vec(modifier_strategy(), 0..32)) {
        let mut reversed = mods.clone();
        reversed.reverse();
        prop_assert_eq!(
            CharacterStatModificationState::aggregate(&mods),
            CharacterStatModificationState::aggregate(&reversed)
        );
    }

    #[test]
    fn aggregation_is_clamped_and_repeatable(mods in prop::collection::vec(modifier_strategy(), 0..32)) {
        let first = CharacterStatModificationState::aggregate(&mods);
        prop_assert_eq!(&first, &CharacterStatModificationState::aggregate(&mods));
        for kind in StatKind::ALL {
            let (lo, hi) = kind.bounds();
            let v = first.get(kind);
            prop_assert!(v >= lo && v <= hi, "{:?} = {} outside [{}, {}]", kind, v, lo, hi);
        }
    }

    // -- Interactions ----------------------------------------------------

    #[test]
    fn unhandled_policy_keeps_one_entry_per_target(targets in prop::collection::vec(0u32..6, 0..40)) {
        let mut buffer: Vec<EntityInteraction> = Vec::new();
        for t in &targets {
            raise_interaction(&mut buffer, EntityId::new(*t, 0), DedupPolicy::Unhandled);
        }
        let mut seen: Vec<EntityId> = buffer.iter().map(|e| e.target).collect();
        seen.sort_by_key(|e| e.to_raw());
        seen.dedup();
        prop_assert_eq!(seen.len(), buffer.len());
        prop_assert!(buffer.iter().all(|e| !e.handled));
    }

    #[test]
    fn lifetime_policy_never_repeats_a_target(
        rounds in prop::collection::vec(prop::collection::vec(0u32..6, 0..8), 0..6),
    ) {
        let mut buffer: Vec<EntityInteraction> = Vec::new();
        let mut raised = 0usize;
        for round in &rounds {
            for t in round {
                if raise_interaction(&mut buffer, EntityId::new(*t, 0), DedupPolicy::Lifetime) {
                    raised += 1;
                }
            }
            // The consumer marks everything handled between ticks.
            for entry in &mut buffer {
                entry.handled = true;
            }
        }
        let distinct: std::collections::BTreeSet<u32> = rounds.iter().flatten().copied().collect();
        prop_assert_eq!(raised, distinct.len());
        prop_assert_eq!(buffer.len(), distinct.len());
    }
}
