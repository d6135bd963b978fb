//! live-preview
//!
//! A development server for visual-novel scripts: compiles the script through
//! an external compiler, serves the result, and reloads connected browsers
//! whenever the script or its assets change.
//!
//! # Architecture Overview
//!
//! ```text
//!    script / assets on disk                       browsers
//!            │                                   ▲        │
//!            ▼                                   │ ws     │ http
//!     ┌─────────────┐   debounce   ┌───────────┐ │  ┌─────▼──────┐
//!     │    watch    │─────────────▶│  compile  │─┼─▶│    http    │
//!     │ notify loops│              │orchestrator│ │  │   router   │
//!     └─────────────┘              └─────┬─────┘ │  └─────┬──────┘
//!                                        │       │        │
//!                                        ▼       │        ▼
//!                                  ┌───────────┐ │  artifact store,
//!                                  │  reload   │─┘  api, static files
//!                                  │  channel  │
//!                                  └───────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use live_preview::compile::CommandCompiler;
use live_preview::config::loader::{read_config, ConfigError};
use live_preview::config::validation::validate_config;
use live_preview::config::{LogFormat, ServerConfig};
use live_preview::lifecycle::{self, signals};
use live_preview::observability::{logging, metrics};
use live_preview::validator;

#[derive(Parser)]
#[command(name = "live-preview")]
#[command(version, about = "Live preview server for visual-novel scripts", long_about = None)]
struct Cli {
    /// Script to compile and serve
    script: PathBuf,

    /// Port to listen on (0 picks a free one)
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Serve the first compile without watching for changes
    #[arg(long)]
    no_watch: bool,

    /// Assets directory, served under /assets/
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Custom stylesheet passed to the compiler
    #[arg(long)]
    css: Option<PathBuf>,

    /// Custom script passed to the compiler
    #[arg(long)]
    js: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compiler command; options are written to its stdin as JSON
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    compiler: Option<Vec<String>>,

    /// Validator command; the script is written to its stdin
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    validator: Option<Vec<String>>,

    /// Log output format
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    match value {
        "pretty" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format {:?} (expected pretty or json)", other)),
    }
}

impl Cli {
    /// Layer the command line over `config`.
    fn apply(self, config: &mut ServerConfig) {
        config.project.script = self.script;
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(host) = self.host {
            config.listener.host = host;
        }
        if self.no_watch {
            config.watch.enabled = false;
        }
        if self.assets.is_some() {
            config.project.assets_dir = self.assets;
        }
        if self.css.is_some() {
            config.project.custom_css = self.css;
        }
        if self.js.is_some() {
            config.project.custom_js = self.js;
        }
        if let Some(command) = self.compiler {
            config.compiler.command = command;
        }
        if let Some(command) = self.validator {
            config.validator.command = command;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(config.observability.log_format);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "live-preview starting");

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Err(ConfigError::Validation(errors).into());
    }

    tracing::info!(
        script = ?config.project.script,
        bind_address = %config.listener.bind_address(),
        watch = config.watch.enabled,
        compiler = ?config.compiler.command,
        "Configuration loaded"
    );

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    let compiler = Arc::new(CommandCompiler::new(&config.compiler.command)?);
    let validator = validator::from_config(&config.validator);

    let handle = lifecycle::start(config, compiler, validator).await?;
    signals::install(handle.clone());

    handle.wait().await;
    Ok(())
}
