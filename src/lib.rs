#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::return_self_not_must_use,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod defaults;
pub mod services;

pub use config::Config;
pub use defaults::{
    resolve, ConfigField, DefaultsResolver, PartialConfiguration, ResolvedConfiguration,
    ServiceDefaults, UnresolvedFieldError,
};

/// Output encoding for a resolved configuration
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `engine: ...` / `url: ...` lines
    #[default]
    Text,
    /// Pretty-printed JSON object
    Json,
    /// TOML document
    Toml,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print the config file path
    Path,
    /// Show the layer chain used to resolve a service
    #[command(long_about = "\
Show the layer chain used to resolve a service.

Layers are listed most specific first: environment, [services.<name>], \
[defaults], registered fallbacks, then the built-in catalog entry. \
Empty layers are omitted.

Examples:
  engine-defaults config show
  engine-defaults config show --service ollama")]
    Show {
        /// Service to build the chain for (defaults to `default_service`)
        #[arg(short, long)]
        service: Option<String>,
    },
    /// Check the config file and report every issue
    Validate,
}
