//! Numeric stat provider.
//!
//! Stat-modifier bookkeeping lives outside the combat core. The core only
//! asks for a number by name through [`StatProvider`] and, for stat-backed
//! health storage, writes current values back through [`StatStore`].

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

use crate::damage::DamageType;

/// Attack speed, added to a weapon's base fire rate.
pub const ATTACK_SPEED: &str = "attack_speed";
/// Outgoing base damage.
pub const DAMAGE: &str = "damage";
/// Outgoing crit chance.
pub const CRIT_CHANCE: &str = "crit_chance";
/// Outgoing crit multiplier.
pub const CRIT_DAMAGE: &str = "crit_damage";
/// Current health.
pub const HEALTH: &str = "health";
/// Maximum health.
pub const MAX_HEALTH: &str = "max_health";
/// Current shield.
pub const SHIELD: &str = "shield";
/// Maximum shield.
pub const MAX_SHIELD: &str = "max_shield";
/// Flat armor.
pub const ARMOR: &str = "armor";
/// Incoming damage multiplier.
pub const DAMAGE_TAKEN: &str = "damage_taken";

/// Returns the stat key for resistance against `damage_type`.
#[must_use]
pub fn resistance_key(damage_type: DamageType) -> String {
    format!("resistance.{}", damage_type.name())
}

/// Opaque source of numeric stats.
pub trait StatProvider {
    /// Returns the stat if it is supplied.
    fn numeric(&self, name: &str) -> Option<f32>;

    /// Returns the stat, or 0 if it is not supplied.
    fn get_numeric(&self, name: &str) -> f32 {
        self.numeric(name).unwrap_or(0.0)
    }
}

/// A provider whose values can also be written.
pub trait StatStore: StatProvider {
    /// Sets a stat value.
    fn set_numeric(&mut self, name: &str, value: f32);
}

/// Flat name → value stat table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSheet {
    values: AHashMap<String, f32>,
}

impl StatSheet {
    /// Creates an empty sheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a stat (builder pattern).
    #[must_use]
    pub fn with(mut self, name: &str, value: f32) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a stat.
    pub fn set(&mut self, name: &str, value: f32) {
        self.values.insert(name.to_string(), value);
    }

    /// Adds `delta` to a stat, treating a missing stat as 0.
    pub fn modify(&mut self, name: &str, delta: f32) {
        *self.values.entry(name.to_string()).or_insert(0.0) += delta;
    }

    /// Removes a stat.
    pub fn remove(&mut self, name: &str) -> Option<f32> {
        self.values.remove(name)
    }

    /// Returns the number of stats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no stats are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl StatProvider for StatSheet {
    fn numeric(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }
}

impl StatStore for StatSheet {
    fn set_numeric(&mut self, name: &str, value: f32) {
        self.set(name, value);
    }
}

// A sheet shared between the combat core and whatever owns stat modifiers.
impl<S: StatProvider> StatProvider for Rc<RefCell<S>> {
    fn numeric(&self, name: &str) -> Option<f32> {
        self.borrow().numeric(name)
    }
}

impl<S: StatStore> StatStore for Rc<RefCell<S>> {
    fn set_numeric(&mut self, name: &str, value: f32) {
        self.borrow_mut().set_numeric(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stat_defaults_to_zero() {
        let sheet = StatSheet::new();
        assert_eq!(sheet.numeric(ARMOR), None);
        assert_eq!(sheet.get_numeric(ARMOR), 0.0);
    }

    #[test]
    fn test_set_and_modify() {
        let mut sheet = StatSheet::new().with(DAMAGE, 10.0);
        sheet.modify(DAMAGE, 5.0);
        sheet.modify(ATTACK_SPEED, 0.5);

        assert_eq!(sheet.get_numeric(DAMAGE), 15.0);
        assert_eq!(sheet.get_numeric(ATTACK_SPEED), 0.5);
        assert_eq!(sheet.len(), 2);
    }

    #[test]
    fn test_resistance_key() {
        assert_eq!(resistance_key(DamageType::Fire), "resistance.fire");
    }

    #[test]
    fn test_shared_sheet_sees_external_writes() {
        let shared = Rc::new(RefCell::new(StatSheet::new()));
        let mut handle = Rc::clone(&shared);

        shared.borrow_mut().set(ARMOR, 4.0);
        assert_eq!(handle.get_numeric(ARMOR), 4.0);

        handle.set_numeric(ARMOR, 2.0);
        assert_eq!(shared.borrow().get_numeric(ARMOR), 2.0);
    }
}
