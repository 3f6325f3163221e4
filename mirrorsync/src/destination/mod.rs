//! Destinations receiving formatted rows: the authoritative tables and their mirrors.

mod base;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod mysql;

pub use base::{Destination, KeyColumns};
