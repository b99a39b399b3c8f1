//! Presentation-facing events.
//!
//! Systems publish [`SimEvent`]s into the per-tick [`EventQueue`]. After the
//! tick completes the simulation hands the drained events to the
//! [`EventBus`], which fans them out to subscribers (UI, audio, VFX).

use glam::Vec3;
use serde::{Deserialize, Serialize};
use survivors_ecs::prelude::EntityId;

use crate::components::EnemyType;
use crate::upgrades::UpgradeDescriptor;
use crate::weapons::WeaponKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    DamageTaken {
        entity: EntityId,
        amount: i32,
        remaining: i32,
    },
    LevelUp {
        level: u32,
        choices: Vec<UpgradeDescriptor>,
    },
    WeaponAcquired {
        kind: WeaponKind,
    },
    WeaponUpgraded {
        kind: WeaponKind,
        level: usize,
    },
    PassiveAcquired {
        id: String,
        level: usize,
    },
    /// A bonus crate was opened and its upgrade applied.
    CrateOpened {
        upgrade: UpgradeDescriptor,
    },
    WaveChanged {
        wave: usize,
    },
    WavesCompleted,
    GameOver {
        tick: u64,
    },
    EnemyKilled {
        entity: EntityId,
        kind: EnemyType,
    },
    DestroyEffect {
        entity: EntityId,
        position: Vec3,
    },
}

/// Events published during the current tick.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<SimEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, event: SimEvent) {
        tracing::trace!(?event, "event published");
        self.events.push(event);
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&SimEvent)>;

/// Subscriber registry. Handlers run in subscription order.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&SimEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn dispatch(&mut self, events: &[SimEvent]) {
        for event in events {
            for (_, handler) in &mut self.handlers {
                handler(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn queue_drains_in_publish_order() {
        let mut queue = EventQueue::new();
        queue.publish(SimEvent::WaveChanged { wave: 1 });
        queue.publish(SimEvent::WavesCompleted);
        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![SimEvent::WaveChanged { wave: 1 }, SimEvent::WavesCompleted]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn unsubscribed_handlers_stop_receiving() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Rc::clone(&seen);
        let id = bus.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        bus.dispatch(&[SimEvent::WavesCompleted]);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.dispatch(&[SimEvent::WaveChanged { wave: 2 }]);

        assert_eq!(seen.borrow().as_slice(), &[SimEvent::WavesCompleted]);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
