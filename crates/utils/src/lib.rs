//! Shared utilities for the shroud workspace.

pub mod errors;
