//! # Skirmish Sim
//!
//! Headless simulation on top of the combat core.
//!
//! This crate provides:
//! - Simulation configuration (`skirmish.toml`)
//! - Weapon and defender loadouts read from TOML files
//! - The `Arena` tick driver
//! - Scenario files, the scenario runner and its report

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod arena;
pub mod config;
pub mod loadout;
pub mod scenario;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::arena::*;
    pub use crate::config::*;
    pub use crate::loadout::*;
    pub use crate::scenario::*;
}

pub use prelude::*;
