//! CLI module for the cloudscale tool.
//!
//! This module provides the command-line interface for reconciling
//! cloudscale.ch resources.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
