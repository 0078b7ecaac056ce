//! Dependency-aware AWS resource cleanup.
//!
//! Discovers resources across services and regions, builds a dependency
//! graph from the relationships providers report, orders deletions so
//! dependents go before the resources they depend on, and executes the
//! plan behind an account safety gate.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod plan;
pub mod provider;
pub mod safety;
pub mod session;
pub mod testing;
