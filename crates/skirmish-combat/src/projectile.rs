//! Projectile carrier.
//!
//! A projectile holds a finished [`DamageRequest`] while it travels toward a
//! target. Its attacker may be destroyed before it lands; the request's
//! numeric payload is unaffected and only the source accessor goes stale.

use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;

use crate::attack::TargetResolver;
use crate::damage::{DamageRequest, DamageResult};
use crate::error::TargetError;

/// A request in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    request: DamageRequest,
    target: EntityId,
    /// Seconds until arrival.
    remaining: f32,
}

impl Projectile {
    /// Launches `request` toward `target`, arriving after `travel_time` seconds.
    #[must_use]
    pub fn new(request: DamageRequest, target: EntityId, travel_time: f32) -> Self {
        Self {
            request,
            target,
            remaining: travel_time.max(0.0),
        }
    }

    /// Returns the carried request.
    #[must_use]
    pub fn request(&self) -> &DamageRequest {
        &self.request
    }

    /// Returns the target handle.
    #[must_use]
    pub fn target(&self) -> EntityId {
        self.target
    }

    /// Returns the unchecked handle of whoever launched it.
    #[must_use]
    pub fn owner(&self) -> Option<EntityId> {
        self.request.source_handle()
    }

    /// Seconds until arrival.
    #[must_use]
    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Whether the projectile has reached its target.
    #[must_use]
    pub fn has_arrived(&self) -> bool {
        self.remaining <= 0.0
    }

    /// Advances travel. Returns true once arrived.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.remaining = (self.remaining - dt).max(0.0);
        self.has_arrived()
    }

    /// Hands the request to the target, consuming the projectile.
    pub fn deliver(self, resolver: &mut dyn TargetResolver) -> Result<DamageResult, TargetError> {
        let damageable = resolver.resolve(self.target)?;
        Ok(damageable.process_damage(&self.request))
    }
}
