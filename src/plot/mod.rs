//! Terminal plots of forecast series.

pub mod ascii;

pub use ascii::*;
