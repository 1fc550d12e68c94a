//! Damage request/result protocol.
//!
//! This module provides:
//! - Damage types
//! - `DamageRequest`, the attacker's intent for one hit
//! - `DamageResult`, what a defender did with it
//! - `Damageable`, the capability a target must implement to be hit

use glam::Vec2;
use serde::{Deserialize, Serialize};
use skirmish_common::{EntityId, EntityLiveness};

// ============================================================================
// Damage Types
// ============================================================================

/// Types of damage that can be dealt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    /// Physical damage.
    Physical,
    /// Fire damage.
    Fire,
    /// Ice/frost damage.
    Ice,
    /// Lightning/electric damage.
    Lightning,
    /// Poison damage.
    Poison,
    /// Arcane/magic damage.
    Arcane,
}

impl Default for DamageType {
    fn default() -> Self {
        Self::Physical
    }
}

impl DamageType {
    /// All damage types, in tag order.
    pub const ALL: [Self; 6] = [
        Self::Physical,
        Self::Fire,
        Self::Ice,
        Self::Lightning,
        Self::Poison,
        Self::Arcane,
    ];

    /// Returns the small-integer tag for this type.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Converts from a raw tag. Unknown tags map to `None`.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Physical),
            1 => Some(Self::Fire),
            2 => Some(Self::Ice),
            3 => Some(Self::Lightning),
            4 => Some(Self::Poison),
            5 => Some(Self::Arcane),
            _ => None,
        }
    }

    /// Returns the lowercase name used in stat keys and config files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Fire => "fire",
            Self::Ice => "ice",
            Self::Lightning => "lightning",
            Self::Poison => "poison",
            Self::Arcane => "arcane",
        }
    }
}

// ============================================================================
// Damage Request
// ============================================================================

/// One attack's worth of damage, built by an attacker and consumed by a
/// defender.
///
/// The numeric fields are copies, so a request stays usable after its source
/// is destroyed. The source itself is only reachable through
/// [`DamageRequest::source`], which re-validates the handle on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageRequest {
    pub(crate) source: Option<EntityId>,
    pub(crate) damage: f32,
    pub(crate) damage_type: DamageType,
    pub(crate) crit_chance: f32,
    pub(crate) crit_damage: f32,
    pub(crate) knockback: Vec2,
}

impl DamageRequest {
    /// Creates a sourceless request.
    #[must_use]
    pub fn new(damage: f32, damage_type: DamageType) -> Self {
        Self {
            source: None,
            damage,
            damage_type,
            crit_chance: 0.0,
            crit_damage: 1.0,
            knockback: Vec2::ZERO,
        }
    }

    /// Sets the source of the damage.
    #[must_use]
    pub fn with_source(mut self, source: EntityId) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets crit chance (clamped to 0..=1) and crit multiplier (at least 1).
    #[must_use]
    pub fn with_crit(mut self, chance: f32, multiplier: f32) -> Self {
        self.crit_chance = chance.clamp(0.0, 1.0);
        self.crit_damage = multiplier.max(1.0);
        self
    }

    /// Sets knockback for the damage.
    #[must_use]
    pub fn with_knockback(mut self, knockback: Vec2) -> Self {
        self.knockback = knockback;
        self
    }

    /// Returns the source if it is still alive according to `world`.
    #[must_use]
    pub fn source(&self, world: &dyn EntityLiveness) -> Option<EntityId> {
        self.source.filter(|id| world.is_alive(*id))
    }

    /// Returns the raw source handle without checking liveness.
    ///
    /// Only for logging and bookkeeping; never dereference it.
    #[must_use]
    pub fn source_handle(&self) -> Option<EntityId> {
        self.source
    }

    /// Returns the requested damage amount.
    #[must_use]
    pub fn damage(&self) -> f32 {
        self.damage
    }

    /// Returns the damage type.
    #[must_use]
    pub fn damage_type(&self) -> DamageType {
        self.damage_type
    }

    /// Returns the crit chance.
    #[must_use]
    pub fn crit_chance(&self) -> f32 {
        self.crit_chance
    }

    /// Returns the crit damage multiplier.
    #[must_use]
    pub fn crit_damage(&self) -> f32 {
        self.crit_damage
    }

    /// Returns the knockback vector.
    #[must_use]
    pub fn knockback(&self) -> Vec2 {
        self.knockback
    }
}

// ============================================================================
// Damage Result
// ============================================================================

/// Why a hit was blocked outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockReason {
    /// The damage type is in the defender's immune set.
    Immune,
    /// The defender is inside an invulnerability window.
    Invulnerable,
    /// The defender is already dead.
    Dead,
}

/// Outcome of resolving a request against a defender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageResult {
    /// The request this result answers.
    pub request: DamageRequest,
    /// Health actually removed.
    pub actual_damage: f32,
    /// Damage absorbed by the shield.
    pub shield_damaged: f32,
    /// Whether the crit roll succeeded.
    pub was_critical: bool,
    /// Whether the hit was blocked before any mitigation.
    pub blocked: bool,
    /// Why the hit was blocked, if it was.
    pub block_reason: Option<BlockReason>,
    /// Damage beyond the health that remained at the moment of a lethal hit.
    pub overkill: f32,
}

impl DamageResult {
    /// Creates an empty (zero damage, unblocked) result for `request`.
    #[must_use]
    pub fn new(request: DamageRequest) -> Self {
        Self {
            request,
            actual_damage: 0.0,
            shield_damaged: 0.0,
            was_critical: false,
            blocked: false,
            block_reason: None,
            overkill: 0.0,
        }
    }

    /// Creates a blocked result.
    #[must_use]
    pub fn blocked(request: DamageRequest, reason: BlockReason) -> Self {
        Self {
            blocked: true,
            block_reason: Some(reason),
            ..Self::new(request)
        }
    }

    /// Health plus shield damage.
    #[must_use]
    pub fn total_damage(&self) -> f32 {
        self.actual_damage + self.shield_damaged
    }

    /// Whether this hit was lethal.
    #[must_use]
    pub fn was_lethal(&self) -> bool {
        self.overkill > 0.0
    }
}

/// Capability of receiving damage.
///
/// A target either implements this or is not damageable; there is no
/// run-time probing for the method.
pub trait Damageable {
    /// Resolves one request and returns the outcome.
    fn process_damage(&mut self, request: &DamageRequest) -> DamageResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_common::EntityAllocator;

    #[test]
    fn test_damage_type_tags_round_trip() {
        for ty in DamageType::ALL {
            assert_eq!(DamageType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(DamageType::from_tag(99), None);
    }

    #[test]
    fn test_request_builder_clamps_crit() {
        let request = DamageRequest::new(10.0, DamageType::Fire).with_crit(1.5, 0.5);
        assert_eq!(request.crit_chance(), 1.0);
        assert_eq!(request.crit_damage(), 1.0);
        assert_eq!(request.damage_type(), DamageType::Fire);
    }

    #[test]
    fn test_stale_source_reads_as_none() {
        let mut world = EntityAllocator::new();
        let attacker = world.allocate();
        let request = DamageRequest::new(10.0, DamageType::Physical).with_source(attacker);

        assert_eq!(request.source(&world), Some(attacker));

        world.free(attacker);
        assert_eq!(request.source(&world), None);
        assert_eq!(request.source_handle(), Some(attacker));
        // Numeric payload is unaffected by the source going away
        assert_eq!(request.damage(), 10.0);
    }

    #[test]
    fn test_blocked_result() {
        let result = DamageResult::blocked(
            DamageRequest::new(5.0, DamageType::Ice),
            BlockReason::Immune,
        );
        assert!(result.blocked);
        assert_eq!(result.block_reason, Some(BlockReason::Immune));
        assert_eq!(result.total_damage(), 0.0);
        assert!(!result.was_lethal());
    }
}
