//! Twinform, dual-target infrastructure synthesis.
//!
//! One construct tree, two artifacts: a deployable cloud template per stack
//! and a local compose manifest that emulates it. Constructs resolve their
//! endpoints for the selected environment, so dependents never branch on it.

pub mod cli;
pub mod cloud;
pub mod core;
pub mod manifest;
pub mod resources;
