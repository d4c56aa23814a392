//! Sprint burndown CLI library.
//!
//! This crate provides the `burndown` command-line interface over the
//! burndown engine and its `SQLite` store.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, SprintAction};
pub use config::Config;
