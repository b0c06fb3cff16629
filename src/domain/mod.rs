//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - request configuration (`ForecastMode`, `Freq`, `Metric`, `ForecastParams`)
//! - backend response shapes (`ForecastResponse`, `JobRecord`)
//! - the per-series visualization model (`SeriesView`, `PredictionRow`, `Band`)
//! - lenient accessors over the raw Markdown payload (`Payload`)

pub mod payload;
pub mod types;

pub use payload::Payload;
pub use types::*;
