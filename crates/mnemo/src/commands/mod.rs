//! Command implementations for the mnemo CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod lifecycle;
pub mod memory;
pub mod recall;
pub mod stats;
