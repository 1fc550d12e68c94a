//! Error types for the combat core.
//!
//! Runtime outcomes (firing on cooldown, hitting an invalid target) are not
//! errors here; they come back as `false`/`None` plus an event. These types
//! cover construction-time wiring mistakes and the reasons carried by
//! failure events.

use skirmish_common::EntityId;
use thiserror::Error;

/// Construction and wiring errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CombatError {
    /// A configuration value is out of its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A stat-backed store was built over a provider lacking a required stat.
    #[error("missing required stat: {name}")]
    MissingStat {
        /// Name of the stat that was not supplied
        name: String,
    },
}

/// Result type for combat construction.
pub type CombatResult<T> = Result<T, CombatError>;

/// Reasons a target could not receive damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TargetError {
    /// The handle refers to an entity that no longer exists.
    #[error("target {0} is stale")]
    Stale(EntityId),

    /// The entity exists but has no damage capability.
    #[error("target {0} cannot take damage")]
    NotDamageable(EntityId),

    /// The handle was never known to the resolver.
    #[error("target {0} is unknown")]
    Unknown(EntityId),
}

impl TargetError {
    /// Returns the target handle this error refers to.
    #[must_use]
    pub const fn target(&self) -> EntityId {
        match self {
            Self::Stale(id) | Self::NotDamageable(id) | Self::Unknown(id) => *id,
        }
    }
}
