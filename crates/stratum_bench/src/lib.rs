//! Benchmarks for the Stratum environment layer.
//!
//! The benchmarks live under `benches/`; this library only carries the
//! shared helpers.

pub mod utils;
