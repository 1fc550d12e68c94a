//! # Skirmish Combat
//!
//! Combat resolution for real-time top-down action games.
//!
//! This crate provides:
//! - Fire control (cooldowns, single shots, continuous bursts)
//! - Attack specs that manufacture damage requests
//! - The damage request/result protocol
//! - The defender mitigation pipeline (crits, resistances, shields,
//!   iframes, death prevention, overkill)
//! - Health storage strategies and the numeric stat provider
//! - Projectile carriers
//! - Typed event signals and an aggregating event bus
//!
//! Everything is single-threaded and tick-driven: each stateful component
//! exposes `update(dt)` and is advanced by the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod attack;
pub mod damage;
pub mod error;
pub mod events;
pub mod fire_control;
pub mod mitigation;
pub mod projectile;
pub mod stats;
pub mod vitals;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::attack::*;
    pub use crate::damage::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::fire_control::*;
    pub use crate::mitigation::*;
    pub use crate::projectile::*;
    pub use crate::stats::{StatProvider, StatSheet, StatStore};
    pub use crate::vitals::*;
}

pub use prelude::*;
