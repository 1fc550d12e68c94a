//! # Skirmish Common
//!
//! Shared types for the Skirmish combat workspace.
//!
//! This crate provides the foundational handle types used by every other
//! crate:
//! - Generational entity handles (`EntityId`)
//! - A slot allocator that issues and revokes them
//! - The liveness check used to resolve revocable references

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
}

pub use prelude::*;
