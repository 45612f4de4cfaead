//! Core synthesis logic: construct tree, naming, ports, endpoints, wiring.

pub mod allocator;
pub mod app;
pub mod config;
pub mod construct;
pub mod digest;
pub mod endpoint;
pub mod error;
pub mod naming;
pub mod scope;
pub mod session;
pub mod types;
pub mod wiring;
