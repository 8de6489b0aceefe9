//! REANIM Test Harness - Mock host, scenarios and stress testing
//!
//! This crate provides:
//! - Mock implementations of every host interface
//! - Rule pack and workload builders
//! - End-to-end playback sessions
//! - Concurrent stress runs with invariant checks
//!
//! Benchmarks live under `benches/`.

pub mod integration;
pub mod mock;
pub mod scenario;
pub mod stress;

pub use integration::*;
pub use mock::*;
pub use scenario::*;
pub use stress::*;
