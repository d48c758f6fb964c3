//! Background tracker of how long each application holds the focus.
//! A daemon samples the focused app, keeps per-day totals and saves them as local json snapshots
//! with an optional backup into a GitHub Gist. The cli starts, stops and queries it.
//!

pub mod cli;
pub mod daemon;
pub mod focus_api;
pub mod fs;
pub mod utils;
