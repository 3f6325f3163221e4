//! Tracing setup shared by mirrorsync binaries and tests.

pub mod tracing;
