//! Log aggregation, statistics and derived analyses.

pub mod aggregator;
pub mod derive;
pub mod stats;

pub use aggregator::*;
