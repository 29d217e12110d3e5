//! Subcommands and the helpers they share.

use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use halsync_core::{ProgressContext, shutdown_flag};
use halsync_sync::R2rClient;

use crate::config::Config;

pub mod inspect;
pub mod prepare;
pub mod sync;

/// Configuration error, no catalog, no input
pub const EXIT_CONFIG: u8 = 1;
/// Remote store unreachable
pub const EXIT_CONNECT: u8 = 2;
/// Some actions failed
pub const EXIT_PARTIAL: u8 = 3;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Client for the configured store, with an optional URL override.
pub fn store_client(config: &Config, base_url: Option<&str>) -> R2rClient {
    R2rClient::new(
        base_url.unwrap_or(&config.remote.base_url),
        config.remote.api_key.clone(),
    )
}

/// Print a key-value summary: a table on a terminal, log lines otherwise.
pub fn print_summary(progress: &ProgressContext, title: &str, rows: &[(&str, String)]) {
    if !progress.is_tty() {
        for (label, value) in rows {
            log::info!("{title}: {label}: {value}");
        }
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// First SIGINT/SIGTERM sets the shutdown flag, the second exits with 130.
pub fn setup_signal_handler() -> Result<()> {
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(i32::from(EXIT_INTERRUPTED));
            }
        })
        .context("Failed to register SIGTERM handler")?;
        signal_hook::low_level::register(signal_hook::consts::SIGINT, || {
            if shutdown_flag().swap(true, Ordering::Relaxed) {
                std::process::exit(i32::from(EXIT_INTERRUPTED));
            }
        })
        .context("Failed to register SIGINT handler")?;
    }
    Ok(())
}
