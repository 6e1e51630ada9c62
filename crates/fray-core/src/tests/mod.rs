//! Test module for determinism and integration tests.
//!
//! This module provides end-to-end tests of the combat engine:
//! - **Determinism tests**: Verify the same seed produces identical fights
//! - **Integration tests**: Drive whole fights through the command surface
//! - **Helper functions**: Utilities for test setup
//!
//! # Test Structure
//!
//! - `determinism.rs`: Tests that verify deterministic execution
//! - `integration.rs`: Scenario tests of complete fights
//! - `helpers.rs`: Test setup utilities and factory functions

mod helpers;

// Re-export for convenience
pub use helpers::*;
