//! Combat notifications.
//!
//! Every component owns a [`Signal`] for its own typed event enum. Listeners
//! subscribe closures and get a [`SubscriptionId`] back for unsubscribing.
//! For code that wants one stream for everything, [`EventBus`] collects
//! [`CombatEvent`]s from any number of signals through a bounded channel.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::damage::{BlockReason, DamageResult, DamageType};
use crate::error::TargetError;

// ============================================================================
// Typed Events
// ============================================================================

/// Events emitted by fire control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeaponEvent {
    /// One shot executed. `shot` is the 1-based index within a burst, 1 for single fire.
    Fired {
        /// Shot index
        shot: u32,
    },
    /// An explicit `fire()` was refused.
    FireRejected {
        /// Cooldown left, 0 if refused because a burst is running
        remaining: f32,
    },
    /// The cooldown just became satisfied.
    CooldownReady,
    /// A continuous-fire burst began.
    BurstStarted,
    /// A burst ended, by stop condition or cancel.
    BurstStopped {
        /// Shots fired during the burst
        shots_fired: u32,
        /// Burst duration in seconds
        elapsed: f32,
    },
}

/// Events emitted by a defender's mitigation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthEvent {
    /// A hit was resolved (blocked or not). Always the last event of a hit.
    DamageTaken(DamageResult),
    /// A hit was blocked by invulnerability or death.
    DamageBlocked {
        /// Why the hit was blocked
        reason: BlockReason,
    },
    /// A hit was ignored because of type immunity.
    ImmunityTriggered {
        /// The immune damage type
        damage_type: DamageType,
    },
    /// The crit roll succeeded.
    CriticalHitTaken {
        /// Damage after mitigation
        damage: f32,
    },
    /// Shield absorbed damage.
    ShieldDamaged {
        /// Amount absorbed
        amount: f32,
        /// Shield left
        remaining: f32,
    },
    /// Shield was emptied with damage left over.
    ShieldBroken {
        /// Damage that carried through to health
        overflow: f32,
    },
    /// Shield was restored.
    ShieldRestored {
        /// Amount restored
        amount: f32,
    },
    /// Health was restored.
    Healed {
        /// Amount healed
        amount: f32,
    },
    /// The defender died.
    Died,
    /// The defender came back to life.
    Revived,
    /// An invulnerability window opened.
    IframesStarted {
        /// Window length in seconds
        duration: f32,
    },
    /// The invulnerability window closed.
    IframesEnded,
    /// A lethal hit was clamped to leave 1 health.
    DeathPrevented {
        /// Damage that was not applied
        prevented: f32,
    },
}

/// Events emitted by an attack spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttackEvent {
    /// A request reached the target and was resolved.
    DamageDealt {
        /// Target hit
        target: EntityId,
        /// Outcome
        result: DamageResult,
    },
    /// The target could not receive damage.
    DamageFailed {
        /// Target attempted
        target: EntityId,
        /// Reason, as text
        reason: String,
    },
}

impl AttackEvent {
    /// Builds a failure event from a target error.
    #[must_use]
    pub fn failed(error: TargetError) -> Self {
        Self::DamageFailed {
            target: error.target(),
            reason: error.to_string(),
        }
    }
}

// ============================================================================
// Signal
// ============================================================================

/// Handle returned by [`Signal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

type Listener<E> = Box<dyn FnMut(&E)>;

/// Synchronous observer list for one event type.
///
/// Listeners run in subscription order, inside the call that emitted.
pub struct Signal<E> {
    listeners: Vec<(SubscriptionId, Listener<E>)>,
    next_id: u32,
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Signal<E> {
    /// Creates a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    /// Delivers an event to every listener.
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Returns the number of listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Any component event, tagged with the entity it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// From an entity's fire control.
    Weapon {
        /// Owning entity
        entity: EntityId,
        /// The event
        event: WeaponEvent,
    },
    /// From an entity's mitigation pipeline.
    Health {
        /// Defending entity
        entity: EntityId,
        /// The event
        event: HealthEvent,
    },
    /// From an entity's attack spec.
    Attack {
        /// Attacking entity
        entity: EntityId,
        /// The event
        event: AttackEvent,
    },
}

/// Sending half shared by the bus and its forwarders.
#[derive(Debug, Clone)]
struct BusSender {
    sender: Sender<CombatEvent>,
    dropped: Arc<AtomicU64>,
}

impl BusSender {
    fn send(&self, event: CombatEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Event bus for collecting events from many components.
///
/// The channel is bounded; events published while it is full are dropped
/// and counted in [`EventBus::dropped_count`].
#[derive(Debug)]
pub struct EventBus {
    /// Sender for publishing events
    sender: BusSender,
    /// Receiver for collecting events
    receiver: Receiver<CombatEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender: BusSender {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: CombatEvent) {
        // Non-blocking send - if full, event is dropped
        self.sender.send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<CombatEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Total events dropped because the channel was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.sender.dropped.load(Ordering::Relaxed)
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forwards a weapon signal onto the bus, tagged with `entity`.
    pub fn forward_weapon(&self, entity: EntityId, signal: &mut Signal<WeaponEvent>) -> SubscriptionId {
        let sender = self.sender.clone();
        signal.subscribe(move |event| {
            sender.send(CombatEvent::Weapon {
                entity,
                event: event.clone(),
            });
        })
    }

    /// Forwards a health signal onto the bus, tagged with `entity`.
    pub fn forward_health(&self, entity: EntityId, signal: &mut Signal<HealthEvent>) -> SubscriptionId {
        let sender = self.sender.clone();
        signal.subscribe(move |event| {
            sender.send(CombatEvent::Health {
                entity,
                event: event.clone(),
            });
        })
    }

    /// Forwards an attack signal onto the bus, tagged with `entity`.
    pub fn forward_attack(&self, entity: EntityId, signal: &mut Signal<AttackEvent>) -> SubscriptionId {
        let sender = self.sender.clone();
        signal.subscribe(move |event| {
            sender.send(CombatEvent::Attack {
                entity,
                event: event.clone(),
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_signal_subscribe_emit() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut signal = Signal::<WeaponEvent>::new();

        let sink = Rc::clone(&seen);
        signal.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        signal.emit(&WeaponEvent::CooldownReady);

        assert_eq!(*seen.borrow(), vec![WeaponEvent::CooldownReady]);
    }

    #[test]
    fn test_signal_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut signal = Signal::<HealthEvent>::new();

        let c = Rc::clone(&count);
        let id = signal.subscribe(move |_| *c.borrow_mut() += 1);
        signal.emit(&HealthEvent::Died);
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.emit(&HealthEvent::Died);

        assert_eq!(*count.borrow(), 1);
        assert_eq!(signal.listener_count(), 0);
    }

    #[test]
    fn test_bus_forwarding() {
        let bus = EventBus::new(16);
        let entity = EntityId::from_parts(1, 0);
        let mut signal = Signal::<HealthEvent>::new();
        bus.forward_health(entity, &mut signal);

        signal.emit(&HealthEvent::Revived);

        assert_eq!(bus.pending_count(), 1);
        let events = bus.drain();
        assert_eq!(
            events,
            vec![CombatEvent::Health {
                entity,
                event: HealthEvent::Revived
            }]
        );
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_bus_drops_when_full() {
        let bus = EventBus::new(1);
        let entity = EntityId::from_parts(0, 0);
        bus.publish(CombatEvent::Weapon {
            entity,
            event: WeaponEvent::BurstStarted,
        });
        bus.publish(CombatEvent::Weapon {
            entity,
            event: WeaponEvent::CooldownReady,
        });
        assert_eq!(bus.drain().len(), 1);
        assert_eq!(bus.dropped_count(), 1);
    }

    #[test]
    fn test_forwarded_overflow_is_counted() {
        let bus = EventBus::new(2);
        let mut signal = Signal::<WeaponEvent>::new();
        bus.forward_weapon(EntityId::from_parts(0, 0), &mut signal);

        for shot in 1..=5 {
            signal.emit(&WeaponEvent::Fired { shot });
        }

        assert_eq!(bus.pending_count(), 2);
        assert_eq!(bus.dropped_count(), 3);
        bus.drain();
        assert_eq!(bus.dropped_count(), 3);
    }
}
