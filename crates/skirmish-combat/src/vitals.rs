//! Health and shield storage strategies.
//!
//! The mitigation pipeline never touches health or shield directly; it goes
//! through [`VitalsStore`]. Two stores are provided:
//! - [`FlatVitals`]: plain fields owned by the defender
//! - [`StatVitals`]: values held in an externally owned stat object

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::damage::DamageType;
use crate::error::{CombatError, CombatResult};
use crate::stats::{self, StatStore};

/// Accessors the mitigation pipeline needs from a defender's storage.
///
/// Setters clamp into `[0, max]`, so a store can never hold out-of-range
/// health or shield.
pub trait VitalsStore {
    /// Current health.
    fn health(&self) -> f32;
    /// Maximum health.
    fn max_health(&self) -> f32;
    /// Sets health, clamped to `[0, max_health]`.
    fn set_health(&mut self, value: f32);

    /// Current shield.
    fn shield(&self) -> f32;
    /// Maximum shield.
    fn max_shield(&self) -> f32;
    /// Sets shield, clamped to `[0, max_shield]`.
    fn set_shield(&mut self, value: f32);

    /// Adds `delta` to health and returns the new value.
    fn modify_health(&mut self, delta: f32) -> f32 {
        self.set_health(self.health() + delta);
        self.health()
    }

    /// Adds `delta` to shield and returns the new value.
    fn modify_shield(&mut self, delta: f32) -> f32 {
        self.set_shield(self.shield() + delta);
        self.shield()
    }

    /// Resistance against `damage_type`. Unclamped; the pipeline caps it.
    fn resistance(&self, _damage_type: DamageType) -> f32 {
        0.0
    }

    /// Flat armor subtracted from each hit.
    fn armor(&self) -> f32 {
        0.0
    }

    /// Multiplier applied to incoming damage after armor.
    fn damage_multiplier(&self) -> f32 {
        1.0
    }
}

// ============================================================================
// Flat Vitals
// ============================================================================

/// Health and shield held in plain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatVitals {
    health: f32,
    max_health: f32,
    shield: f32,
    max_shield: f32,
    /// Flat armor.
    pub armor: f32,
    /// Incoming damage multiplier.
    pub damage_multiplier: f32,
    /// Per-type resistances.
    pub resistances: HashMap<DamageType, f32>,
}

impl FlatVitals {
    /// Creates a store at full health with no shield.
    #[must_use]
    pub fn new(max_health: f32) -> Self {
        let max_health = max_health.max(0.0);
        Self {
            health: max_health,
            max_health,
            shield: 0.0,
            max_shield: 0.0,
            armor: 0.0,
            damage_multiplier: 1.0,
            resistances: HashMap::new(),
        }
    }

    /// Sets a full shield of `max_shield`.
    #[must_use]
    pub fn with_shield(mut self, max_shield: f32) -> Self {
        self.max_shield = max_shield.max(0.0);
        self.shield = self.max_shield;
        self
    }

    /// Sets current health (clamped).
    #[must_use]
    pub fn with_health(mut self, health: f32) -> Self {
        self.set_health(health);
        self
    }

    /// Sets armor.
    #[must_use]
    pub fn with_armor(mut self, armor: f32) -> Self {
        self.armor = armor;
        self
    }

    /// Sets the incoming damage multiplier.
    #[must_use]
    pub fn with_damage_multiplier(mut self, multiplier: f32) -> Self {
        self.damage_multiplier = multiplier;
        self
    }

    /// Adds a resistance.
    #[must_use]
    pub fn with_resistance(mut self, damage_type: DamageType, value: f32) -> Self {
        self.resistances.insert(damage_type, value);
        self
    }
}

impl VitalsStore for FlatVitals {
    fn health(&self) -> f32 {
        self.health
    }

    fn max_health(&self) -> f32 {
        self.max_health
    }

    fn set_health(&mut self, value: f32) {
        self.health = value.clamp(0.0, self.max_health);
    }

    fn shield(&self) -> f32 {
        self.shield
    }

    fn max_shield(&self) -> f32 {
        self.max_shield
    }

    fn set_shield(&mut self, value: f32) {
        self.shield = value.clamp(0.0, self.max_shield);
    }

    fn resistance(&self, damage_type: DamageType) -> f32 {
        self.resistances.get(&damage_type).copied().unwrap_or(0.0)
    }

    fn armor(&self) -> f32 {
        self.armor
    }

    fn damage_multiplier(&self) -> f32 {
        self.damage_multiplier
    }
}

// ============================================================================
// Stat Vitals
// ============================================================================

/// Health and shield held in an external stat object.
///
/// Maximums, armor, multiplier and resistances are re-read on every access,
/// so modifiers applied by the stat owner take effect on the next hit.
#[derive(Debug, Clone)]
pub struct StatVitals<S> {
    stats: S,
}

impl<S: StatStore> StatVitals<S> {
    /// Wraps a stat object. Fails if `health` or `max_health` is not supplied.
    pub fn new(stats: S) -> CombatResult<Self> {
        for name in [stats::HEALTH, stats::MAX_HEALTH] {
            if stats.numeric(name).is_none() {
                return Err(CombatError::MissingStat {
                    name: name.to_string(),
                });
            }
        }
        Ok(Self { stats })
    }

    /// Returns the wrapped stat object.
    pub fn stats(&self) -> &S {
        &self.stats
    }

    /// Returns the wrapped stat object mutably.
    pub fn stats_mut(&mut self) -> &mut S {
        &mut self.stats
    }
}

impl<S: StatStore> VitalsStore for StatVitals<S> {
    fn health(&self) -> f32 {
        self.stats.get_numeric(stats::HEALTH)
    }

    fn max_health(&self) -> f32 {
        self.stats.get_numeric(stats::MAX_HEALTH).max(0.0)
    }

    fn set_health(&mut self, value: f32) {
        let clamped = value.clamp(0.0, self.max_health());
        self.stats.set_numeric(stats::HEALTH, clamped);
    }

    fn shield(&self) -> f32 {
        self.stats.get_numeric(stats::SHIELD)
    }

    fn max_shield(&self) -> f32 {
        self.stats.get_numeric(stats::MAX_SHIELD).max(0.0)
    }

    fn set_shield(&mut self, value: f32) {
        let clamped = value.clamp(0.0, self.max_shield());
        self.stats.set_numeric(stats::SHIELD, clamped);
    }

    fn resistance(&self, damage_type: DamageType) -> f32 {
        self.stats.get_numeric(&stats::resistance_key(damage_type))
    }

    fn armor(&self) -> f32 {
        self.stats.get_numeric(stats::ARMOR)
    }

    fn damage_multiplier(&self) -> f32 {
        self.stats.numeric(stats::DAMAGE_TAKEN).unwrap_or(1.0)
    }
}
