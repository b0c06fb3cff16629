//! `ts-forecast` library crate.
//!
//! The binary (`tsf`) is a thin wrapper around this library so that:
//!
//! - the Markdown parsing and series view logic is testable without a backend
//! - the CLI and the TUI share one request pipeline

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod plot;
pub mod report;
pub mod tui;
pub mod view;
