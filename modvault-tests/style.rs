//! Style Enforcement Tests
//!
//! Checks that cannot be expressed with clippy alone.
//!
//! # Test Organization
//!
//! - `log_hygiene` - Keeps upstream locations out of log and print macros
//!
//! These tests scan the production sources of every workspace crate and fail
//! if violations are found.

#[path = "style/log_hygiene.rs"]
mod log_hygiene;
