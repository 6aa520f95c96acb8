//! # Configuration
//!
//! Centralized configuration constants for the engine. See [`constants`] for
//! the full dependency graph between values.

mod constants;

pub use constants::*;
