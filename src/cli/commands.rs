//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cloudscale - Declarative, idempotent cloudscale.ch resource manager.
#[derive(Parser, Debug)]
#[command(name = "cloudscale")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, global = true, env = "CLOUDSCALE_CONFIG")]
    pub config: Option<PathBuf>,

    /// API token (defaults to `CLOUDSCALE_API_TOKEN`).
    #[arg(long, global = true, env = "CLOUDSCALE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the manifest without contacting the API.
    Validate {
        /// Show warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what apply would change.
    Plan {
        /// Show every field change.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Reconcile every manifest resource, in order.
    Apply {
        /// Compute changes without applying them.
        #[arg(long)]
        check: bool,

        /// Continue with the next resource after a failure.
        #[arg(long)]
        keep_going: bool,
    },

    /// Reconcile a single resource given as JSON.
    Module {
        /// Resource kind, e.g. `server` or `floating_ip`.
        kind: String,

        /// Desired state as a JSON mapping.
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Compute changes without applying them.
        #[arg(long)]
        check: bool,
    },

    /// Export servers as a dynamic inventory.
    Inventory {
        /// List every host; this is what runs when `--host` is not given.
        #[arg(long, conflicts_with = "host")]
        list: bool,

        /// Show the variables of one host.
        #[arg(long)]
        host: Option<String>,
    },

    /// List the supported resource kinds and their fields.
    Kinds,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::try_parse_from(["cloudscale", "apply", "--check", "--keep-going"])
            .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Commands::Apply {
                check: true,
                keep_going: true
            }
        ));
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_parse_module_invocation() {
        let cli = Cli::try_parse_from([
            "cloudscale",
            "--output",
            "json",
            "module",
            "volume",
            "--args",
            r#"{"name": "data", "size_gb": 50}"#,
            "--check",
        ])
        .expect("valid arguments");

        assert_eq!(cli.output, OutputFormat::Json);
        let Commands::Module { kind, args, check } = cli.command else {
            panic!("module command expected");
        };
        assert_eq!(kind, "volume");
        assert!(args.contains("size_gb"));
        assert!(check);
    }

    #[test]
    fn test_inventory_list_and_host_conflict() {
        assert!(Cli::try_parse_from(["cloudscale", "inventory", "--list", "--host", "web1"]).is_err());
    }
}
