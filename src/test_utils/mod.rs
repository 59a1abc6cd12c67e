//! Test utilities for integration testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory port implementations for mocking persistence and the gateway
//! - A builder for constructing `AppState` with test dependencies

mod factories;
mod payment_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use payment_mocks::*;
