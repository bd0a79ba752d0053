//! Aggregation of published statistics.
//!
//! `merge` holds the pure merge rules, `runner` drives them over a storage.

pub mod merge;
pub mod runner;

pub use runner::{Aggregator, RunOptions};
