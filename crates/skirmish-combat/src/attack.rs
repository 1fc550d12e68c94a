//! Attacker-side damage configuration.
//!
//! An [`AttackSpec`] turns per-attacker numbers into [`DamageRequest`]s and
//! dispatches them to targets found through a [`TargetResolver`].

use glam::Vec2;
use serde::{Deserialize, Serialize};
use skirmish_common::EntityId;
use tracing::trace;

use crate::damage::{DamageRequest, DamageResult, DamageType, Damageable};
use crate::error::{CombatError, CombatResult, TargetError};
use crate::events::{AttackEvent, Signal};
use crate::stats::{self, StatProvider};

/// Attack configuration as loaded from data files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Base damage per hit.
    pub damage: f32,
    /// Damage type.
    pub damage_type: DamageType,
    /// Crit chance (0.0 - 1.0).
    pub crit_chance: f32,
    /// Crit damage multiplier.
    pub crit_multiplier: f32,
    /// Knockback applied on hit.
    pub knockback: Vec2,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            damage: 10.0,
            damage_type: DamageType::Physical,
            crit_chance: 0.0,
            crit_multiplier: 2.0,
            knockback: Vec2::ZERO,
        }
    }
}

impl AttackConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> CombatResult<()> {
        if !self.damage.is_finite() || self.damage < 0.0 {
            return Err(CombatError::InvalidConfig(format!(
                "damage must be >= 0, got {}",
                self.damage
            )));
        }
        if !(0.0..=1.0).contains(&self.crit_chance) {
            return Err(CombatError::InvalidConfig(format!(
                "crit_chance must be in 0..=1, got {}",
                self.crit_chance
            )));
        }
        if !self.crit_multiplier.is_finite() || self.crit_multiplier < 1.0 {
            return Err(CombatError::InvalidConfig(format!(
                "crit_multiplier must be >= 1, got {}",
                self.crit_multiplier
            )));
        }
        Ok(())
    }
}

/// Looks up the damage capability of a target handle.
pub trait TargetResolver {
    /// Returns the target's damage capability, or why it has none.
    fn resolve(&mut self, target: EntityId) -> Result<&mut dyn Damageable, TargetError>;
}

/// Per-attacker damage parameters and request factory.
#[derive(Debug)]
pub struct AttackSpec {
    damage: f32,
    damage_type: DamageType,
    crit_chance: f32,
    crit_multiplier: f32,
    knockback: Vec2,
    owner: Option<EntityId>,
    events: Signal<AttackEvent>,
}

impl AttackSpec {
    /// Creates a spec from configuration. Out-of-range crit values are clamped.
    #[must_use]
    pub fn new(config: &AttackConfig) -> Self {
        Self {
            damage: config.damage.max(0.0),
            damage_type: config.damage_type,
            crit_chance: config.crit_chance.clamp(0.0, 1.0),
            crit_multiplier: config.crit_multiplier.max(1.0),
            knockback: config.knockback,
            owner: None,
            events: Signal::new(),
        }
    }

    /// Sets the owner (builder pattern).
    #[must_use]
    pub fn with_owner(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Changes the owner stamped on subsequent requests.
    pub fn set_owner(&mut self, owner: Option<EntityId>) {
        self.owner = owner;
    }

    /// Returns the current owner handle.
    #[must_use]
    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    /// Returns base damage.
    #[must_use]
    pub fn damage(&self) -> f32 {
        self.damage
    }

    /// Returns the damage type.
    #[must_use]
    pub fn damage_type(&self) -> DamageType {
        self.damage_type
    }

    /// Returns crit chance.
    #[must_use]
    pub fn crit_chance(&self) -> f32 {
        self.crit_chance
    }

    /// Returns the crit multiplier.
    #[must_use]
    pub fn crit_multiplier(&self) -> f32 {
        self.crit_multiplier
    }

    /// Sets base damage.
    pub fn set_damage(&mut self, damage: f32) {
        self.damage = damage.max(0.0);
    }

    /// Sets the damage type.
    pub fn set_damage_type(&mut self, damage_type: DamageType) {
        self.damage_type = damage_type;
    }

    /// Pulls damage and crit values from a stat provider.
    ///
    /// Stats the provider does not supply keep their current value.
    pub fn refresh_from(&mut self, provider: &impl StatProvider) {
        if let Some(damage) = provider.numeric(stats::DAMAGE) {
            self.damage = damage.max(0.0);
        }
        if let Some(chance) = provider.numeric(stats::CRIT_CHANCE) {
            self.crit_chance = chance.clamp(0.0, 1.0);
        }
        if let Some(multiplier) = provider.numeric(stats::CRIT_DAMAGE) {
            self.crit_multiplier = multiplier.max(1.0);
        }
    }

    /// Returns the event signal.
    pub fn events(&mut self) -> &mut Signal<AttackEvent> {
        &mut self.events
    }

    /// Builds a request from the current values and owner.
    #[must_use]
    pub fn create_request(&self) -> DamageRequest {
        let mut request = DamageRequest::new(self.damage, self.damage_type)
            .with_crit(self.crit_chance, self.crit_multiplier)
            .with_knockback(self.knockback);
        request.source = self.owner;
        request
    }

    /// Builds a request and dispatches it to `target`.
    ///
    /// Returns `None` and emits a failure event if the target cannot be hit.
    pub fn apply_to(
        &mut self,
        target: EntityId,
        resolver: &mut dyn TargetResolver,
    ) -> Option<DamageResult> {
        let request = self.create_request();

        match resolver.resolve(target) {
            Ok(damageable) => {
                let result = damageable.process_damage(&request);
                trace!(%target, damage = result.total_damage(), "attack applied");
                self.events.emit(&AttackEvent::DamageDealt {
                    target,
                    result: result.clone(),
                });
                Some(result)
            }
            Err(error) => {
                trace!(%target, %error, "attack failed");
                self.events.emit(&AttackEvent::failed(error));
                None
            }
        }
    }
}
