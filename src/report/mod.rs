//! Console reports and chart output.

pub mod charts;
pub mod generator;

pub use generator::*;
