//! Shared error definitions and helpers used across all modelswitch crates.

pub mod error;

pub use error::{Error, FromMessage, Result};
