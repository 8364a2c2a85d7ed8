//! Tiered CLI library: command implementations shared by the `tiered`
//! binary and its integration tests.

pub mod commands;
