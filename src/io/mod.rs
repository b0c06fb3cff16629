//! Input/output helpers.
//!
//! - Markdown payload extraction + pre-check (`markdown`)
//! - prediction exports (CSV/JSON) and saved responses (`export`)

pub mod export;
pub mod markdown;

pub use export::*;
pub use markdown::*;
