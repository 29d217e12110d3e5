//! halsync - keep a document store in step with a bibliographic catalog
//!
//! Prepares deduplicated catalog snapshots from raw source responses,
//! reconciles them with local fulltext files and the remote store, and
//! inspects what the store holds.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "halsync")]
#[command(about = "Synchronize a document store with a bibliographic catalog")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_parser = ["debug", "info", "warning", "warn", "error"]
    )]
    log_level: String,

    /// Config file path (default: ./halsync.toml or ~/.config/halsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,

    /// Maximum retry attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Build a deduplicated catalog snapshot from the latest raw response
    Prepare(cmd::prepare::PrepareArgs),
    /// Reconcile catalog, local files and remote store (dry run by default)
    Sync(cmd::sync::SyncArgs),
    /// Read-only reports on the remote store
    Inspect(cmd::inspect::InspectArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(halsync_core::ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    halsync_core::init_logging(&cli.log_level, multi);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(cmd::EXIT_CONFIG);
        }
    };

    // Apply HTTP settings (config file defaults, CLI overrides)
    halsync_core::set_http_config(halsync_core::HttpConfig {
        connect_timeout: Duration::from_secs(config.http.connect_timeout),
        request_timeout: Duration::from_secs(
            cli.request_timeout.unwrap_or(config.http.request_timeout),
        ),
        max_retries: cli.max_retries.unwrap_or(config.http.max_retries),
    });

    let result = match cli.command {
        Command::Prepare(args) => cmd::prepare::run(args, &config, &progress),
        Command::Sync(args) => cmd::sync::run(args, &config, &progress),
        Command::Inspect(args) => cmd::inspect::run(args, &config, &progress),
        Command::Config => {
            print_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(cmd::EXIT_CONFIG)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let paths = &config.paths;
    table.add_row(vec!["Raw directory", &paths.raw_dir.display().to_string()]);
    table.add_row(vec!["Prepared directory", &paths.prepared_dir.display().to_string()]);
    table.add_row(vec![
        "Legacy catalog",
        &paths
            .legacy_catalog
            .as_ref()
            .map_or_else(|| "none".to_string(), |p| p.display().to_string()),
    ]);
    table.add_row(vec!["Documents directory", &paths.documents_dir.display().to_string()]);
    table.add_row(vec!["Blacklist", &paths.blacklist.display().to_string()]);
    table.add_row(vec!["Remote URL", &config.remote.base_url]);
    table.add_row(vec![
        "API key",
        if config.remote.api_key.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Collection",
        config.remote.collection.as_deref().unwrap_or("none"),
    ]);
    table.add_row(vec![
        "Page size",
        &format!("{} ({}ms apart)", config.remote.page_size, config.remote.page_delay_ms),
    ]);
    table.add_row(vec!["Max upload", &config.upload.max_upload.to_string()]);
    table.add_row(vec![
        "Max file size",
        &format!("{} bytes", halsync_core::fmt_num(config.upload.max_file_size as usize)),
    ]);
    table.add_row(vec!["Extension", &config.upload.extension]);
    table.add_row(vec!["On mismatch", config.upload.on_mismatch.as_str()]);
    table.add_row(vec![
        "Lab acronym",
        config.catalog.lab_acronym.as_deref().unwrap_or("none"),
    ]);
    table.add_row(vec![
        "Timeouts",
        &format!(
            "connect {}s, request {}s",
            config.http.connect_timeout, config.http.request_timeout
        ),
    ]);
    table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

    eprintln!("\n{table}");
}
