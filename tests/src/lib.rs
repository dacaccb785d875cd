//! Workspace-level integration tests: end-to-end pipeline scenarios,
//! determinism guarantees, and property-based checks over the transform
//! passes.

#![cfg(test)]

mod determinism;
mod pipeline;
mod properties;
mod scenarios;
mod support;
