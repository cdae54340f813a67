//! ideterm - the terminal panel of a lightweight IDE shell
//!
//! A full-screen console app with a terminal panel docked at the bottom. Lines
//! typed at the prompt are edited locally, resolved as builtins (`help`,
//! `clear`) or sent to a remote execution endpoint, optionally translated
//! from natural language into a shell command first.
//!
//! # Features
//!
//! - **Line Editing**: prompt, backspace, command history on Up/Down
//! - **Remote Execution**: `POST {command}` to an execution endpoint
//! - **Translation Mode**: natural language to shell via a chat-completion API
//! - **Ordered Output**: one command in flight per session, results in order
//! - **Expandable Panel**: animated expand/collapse with re-fitting
//! - **Color Schemes**: 4 built-in themes with runtime switching
//!
//! # Quick Start
//!
//! ```text
//! ideterm                       # Settings from ~/.ideterm/config.toml
//! ideterm -t                    # Natural-language translation mode
//! ideterm -u http://host/api/terminal
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+E | Expand/collapse the terminal panel |
//! | Ctrl+K | Clear the terminal |
//! | Ctrl+T | Next color scheme |
//! | Ctrl+Q | Quit |
//! | Shift+PageUp/PageDown | Scroll back/forward |

mod app;
mod config;
mod core;
mod ui;

use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::App;
use crate::config::{ColorScheme, Config, RouterMode};
use crate::core::remote::{ChatSettings, ChatTranslator, HttpExecutor};
use crate::core::router::{CommandRouter, RoutingPolicy};
use crate::ui::Renderer;

/// Command-line options; each overrides the config file
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    mode: Option<RouterMode>,
    execution_url: Option<String>,
    theme: Option<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("ideterm {}", VERSION);
}

fn print_help() {
    eprintln!("ideterm {} - terminal panel with remote command execution", VERSION);
    eprintln!();
    eprintln!("Usage: ideterm [OPTIONS]");
    eprintln!();
    eprintln!("Routing options:");
    eprintln!("  (default)             From config.toml, or direct execution");
    eprintln!("  -d, --direct          Send lines straight to the execution endpoint");
    eprintln!("  -t, --translate       Translate natural language into shell commands");
    eprintln!("  -u, --url <URL>       Execution endpoint URL");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.ideterm/config.toml)");
    eprintln!("      --theme <NAME>    Color scheme");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keybindings:");
    eprintln!("  Ctrl+E                Expand/collapse terminal panel");
    eprintln!("  Ctrl+K                Clear terminal");
    eprintln!("  Ctrl+T                Next color scheme");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!("  Shift+PageUp/Down     Scroll back/forward");
    eprintln!("  Up/Down               Command history");
    eprintln!();
    eprintln!("Terminal commands: help, clear; anything else is routed remotely.");
    eprintln!();
    eprintln!("Color schemes: {}", ColorScheme::list().join(", "));
    eprintln!("Log file: ~/.ideterm/ideterm.log (level from RUST_LOG)");
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli = CliArgs::default();
    let mut i = 1;

    let value = |i: usize, name: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("Missing {} argument", name))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-d" | "--direct" => {
                cli.mode = Some(RouterMode::Direct);
            }
            "-t" | "--translate" => {
                cli.mode = Some(RouterMode::Translate);
            }
            "-u" | "--url" => {
                i += 1;
                cli.execution_url = Some(value(i, "URL")?);
            }
            "-c" | "--config" => {
                i += 1;
                cli.config_path = Some(PathBuf::from(value(i, "config path")?));
            }
            "--theme" => {
                i += 1;
                cli.theme = Some(value(i, "theme")?);
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(cli)
}

/// Log to `~/.ideterm/ideterm.log`; the UI owns stdout
fn init_logging() {
    let log_path = Config::log_path().unwrap_or_else(|| PathBuf::from("ideterm.log"));

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn load_config(cli: &CliArgs) -> Config {
    let mut config = match &cli.config_path {
        Some(path) => Config::load_or_default(path),
        None => Config::load(),
    };

    // Command line overrides the file
    if let Some(mode) = cli.mode {
        config.router.mode = mode;
    }
    if let Some(url) = &cli.execution_url {
        config.router.execution_url = url.clone();
    }
    if let Some(theme) = &cli.theme {
        config.color_scheme = theme.clone();
    }
    config
}

fn build_router(config: &Config) -> anyhow::Result<CommandRouter> {
    let timeout = config.request_timeout();
    let executor = HttpExecutor::new(config.router.execution_url.clone(), timeout)
        .context("failed to create execution client")?;
    info!("Execution endpoint: {}", executor.url());

    let policy = match config.router.mode {
        RouterMode::Direct => RoutingPolicy::Direct,
        RouterMode::Translate => {
            let translator = &config.translator;
            let translator = ChatTranslator::new(ChatSettings {
                endpoint: translator.endpoint.clone(),
                model: translator.model.clone(),
                system_prompt: translator.system_prompt.clone(),
                temperature: translator.temperature,
                max_tokens: translator.max_tokens,
                api_key: translator.api_key.clone(),
                timeout,
            })
            .context("failed to create translation client")?;
            info!(
                "Translation endpoint: {} ({})",
                config.translator.endpoint, config.translator.model
            );
            RoutingPolicy::Translate {
                translator: Arc::new(translator),
                marker: config.router.command_marker.clone(),
            }
        }
    };

    Ok(CommandRouter::new(Arc::new(executor), policy))
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("ideterm {} starting...", VERSION);

    let config = load_config(&cli);
    info!("Routing mode: {:?}", config.router.mode);

    // Network calls run on a small runtime; the UI loop stays on this thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("ideterm-dispatch")
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let router = Arc::new(build_router(&config)?);

    let (cols, rows) = Renderer::size()?;
    info!("Terminal size: {}x{}", cols, rows);

    // Initialize renderer and run with guaranteed cleanup
    let mut renderer = Renderer::new(config.get_color_scheme());
    renderer.init()?;

    print!("\x1b]0;ideterm - {} mode\x07", router.policy().name());
    let _ = std::io::stdout().flush();

    let mut app = App::new(&config, router, runtime.handle().clone(), renderer, (cols, rows));
    let result = app.run();
    drop(app);

    if let Err(e) = &result {
        error!("Event loop failed: {:#}", e);
    }

    runtime.shutdown_timeout(Duration::from_millis(500));
    info!("ideterm exiting");
    result
}
