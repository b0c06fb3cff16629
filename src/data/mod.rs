//! Backend access.
//!
//! - HTTP client, request building and error mapping (`client`)
//! - typed reading of the response `metrics` object (`metrics`)

pub mod client;
pub mod metrics;

pub use client::{ClientConfig, ClientError, ForecastClient};
pub use metrics::{MetricValue, MetricWarning, MetricsReport};
