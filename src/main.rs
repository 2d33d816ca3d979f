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

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use engine_defaults::config::{resolve_config_path, ConfigValidator, DefaultsValidator};
use engine_defaults::services::{self, LayerRegistry};
use engine_defaults::{
    Config, ConfigCommands, OutputFormat, PartialConfiguration, ResolvedConfiguration,
    UnresolvedFieldError,
};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// `engine-defaults` - resolve which engine and endpoint an AI client should use.
#[derive(Parser, Debug)]
#[command(name = "engine-defaults")]
#[command(version)]
#[command(about = "Resolve engine and endpoint defaults for AI services.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the engine and endpoint for a service
    #[command(long_about = "\
Resolve the engine and endpoint for a service.

Explicit --engine/--url values always win. Missing fields fall back to \
the environment (ENGINE_DEFAULTS_ENGINE / ENGINE_DEFAULTS_URL), then \
[services.<name>], then [defaults], then registered layers, then the \
built-in catalog.

Examples:
  engine-defaults resolve
  engine-defaults resolve --service ollama
  engine-defaults resolve -s openai --engine gpt-4o --format json
  engine-defaults resolve -s custom:https://proxy.example.com/v1 --engine my-model")]
    Resolve {
        /// Service to resolve for (defaults to `default_service`)
        #[arg(short, long)]
        service: Option<String>,

        /// Engine/model to use regardless of defaults
        #[arg(short, long)]
        engine: Option<String>,

        /// Endpoint to use regardless of defaults
        #[arg(short, long)]
        url: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List built-in services and their defaults
    Services,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("ENGINE_DEFAULTS_CONFIG_DIR", config_dir);
    }

    // Logs go to stderr so resolved output on stdout stays machine-readable.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match cli.command {
        Commands::Resolve {
            service,
            engine,
            url,
            format,
        } => {
            let config = Config::load_or_init().await?;
            let overrides = PartialConfiguration { engine, url };
            let resolved = config
                .resolve(service.as_deref(), &overrides)
                .map_err(|e| unresolved_hint(&e, &config))?;
            debug!(
                service = config.effective_service(service.as_deref()).unwrap_or("(none)"),
                engine = resolved.engine(),
                url = resolved.url(),
                "Resolved configuration"
            );
            println!("{}", render_resolved(&resolved, format)?);
            Ok(())
        }

        Commands::Services => {
            let config = Config::load_or_init().await?;
            print_services(&config);
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            // Path and Validate must work even when the config file does not validate.
            ConfigCommands::Path => {
                println!("{}", resolve_config_path()?.display());
                Ok(())
            }
            ConfigCommands::Validate => validate_config_file().await,
            ConfigCommands::Show { service } => {
                let config = Config::load_or_init().await?;
                show_layers(&config, service.as_deref());
                Ok(())
            }
        },
    }
}

fn print_services(config: &Config) {
    let current = config.effective_service(None).unwrap_or_default();
    println!(
        "Built-in services ({} total):\n",
        services::list_services().len()
    );
    println!("  ID (use in config)  ENGINE                          URL");
    println!("  ─────────────────── ─────────────────────────────── ───");
    for s in services::list_services() {
        let marker = if s.matches(current) { " (active)" } else { "" };
        let local_tag = if s.local { " [local]" } else { "" };
        let aliases = if s.aliases.is_empty() {
            String::new()
        } else {
            format!("  (aliases: {})", s.aliases.join(", "))
        };
        println!(
            "  {:<19} {:<31} {}{}{}{}",
            s.name, s.engine, s.url, local_tag, marker, aliases
        );
    }
    println!("\n  custom:<URL>   Any OpenAI-compatible endpoint (supplies url only)");
}

fn show_layers(config: &Config, service: Option<&str>) {
    println!("Config:   {}", config.config_path.display());
    println!(
        "Service:  {}",
        config.effective_service(service).unwrap_or("(none)")
    );
    println!();
    let registry = LayerRegistry::global().snapshot();
    let layers = config.labeled_layers_with(service, &registry);
    if layers.is_empty() {
        println!("No defaults layers apply.");
    }
    for (source, layer) in layers {
        println!(
            "  {:<24} engine={:<32} url={}",
            source.to_string(),
            layer.engine.as_deref().unwrap_or("-"),
            layer.url.as_deref().unwrap_or("-")
        );
    }
}

fn unresolved_hint(err: &UnresolvedFieldError, config: &Config) -> anyhow::Error {
    let field = err.field.as_str();
    anyhow::anyhow!(
        "{err}. Pass --{field}, set ENGINE_DEFAULTS_{}, or add `{field}` under [defaults] in {}",
        field.to_ascii_uppercase(),
        config.config_path.display()
    )
}

fn render_resolved(resolved: &ResolvedConfiguration, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format!(
            "engine: {}\nurl: {}",
            resolved.engine(),
            resolved.url()
        )),
        OutputFormat::Json => {
            serde_json::to_string_pretty(resolved).context("Failed to encode resolved config")
        }
        OutputFormat::Toml => Ok(toml::to_string(resolved)
            .context("Failed to encode resolved config")?
            .trim_end()
            .to_string()),
    }
}

async fn validate_config_file() -> Result<()> {
    let path = resolve_config_path()?;
    if !path.exists() {
        println!("{} does not exist; built-in defaults apply.", path.display());
        return Ok(());
    }

    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config = Config::from_toml(&contents)?;
    config.config_path = path;
    config.apply_env_overrides();

    let issues = DefaultsValidator.validate(&config);
    if issues.is_empty() {
        println!("{}: ok", config.config_path.display());
        return Ok(());
    }

    for issue in &issues {
        println!("  {issue}");
    }
    let errors = issues.iter().filter(|issue| issue.is_error()).count();
    if errors > 0 {
        bail!("{errors} error(s) in {}", config.config_path.display());
    }
    Ok(())
}
