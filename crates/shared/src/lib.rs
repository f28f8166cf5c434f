//! Shared types and utilities for the link-in-bio platform.
//!
//! This crate contains the plan/status enums and database helpers used by
//! both the API and billing crates.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
