//! Logic Module - Detection & Response Engines
//!
//! Leaf-first: `events` and `store` have no dependencies on the engines,
//! `orchestrator` depends on all of them.

// Shared vocabulary & storage
pub mod events;
pub mod store;
pub mod config;

// Engines
pub mod monitor;
pub mod alerting;
pub mod behavior;
pub mod threat;
pub mod incident;

// Composition root helpers
pub mod orchestrator;
