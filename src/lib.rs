//! labscribe library crate
//!
//! Exposes the generation pipeline and HTTP surface so the binary, the
//! integration tests and the benchmarks share one implementation.

pub mod config;
pub mod generate;
pub mod server;
pub mod util;
