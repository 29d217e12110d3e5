//! `halsync sync` - reconcile the catalog with local files and the remote store

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use halsync_catalog::{deduplicate, load_catalog, resolve_catalog_path};
use halsync_core::{SharedProgress, fmt_num, is_shutdown_requested, shutdown_flag};
use halsync_sync::{
    ExecuteOptions, FetchOptions, LocalInventory, LocalOptions, MismatchMode, SyncSummary, Target,
    check_connection, execute, fetch_inventory, reconcile,
};

use super::{EXIT_CONNECT, EXIT_INTERRUPTED, EXIT_PARTIAL};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Catalog file (default: latest prepared catalog, else the legacy path)
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Directory holding the fulltext files
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Remote store API endpoint
    #[arg(long)]
    pub base_url: Option<String>,

    /// Collection to assign uploads to
    #[arg(long)]
    pub collection: Option<String>,

    /// Successful uploads allowed this run (0 = dry run)
    #[arg(long)]
    pub max_upload: Option<usize>,

    /// Largest file to upload, in bytes
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Which decisions to carry out
    #[arg(long, default_value = "all")]
    pub target: Target,

    /// Resolve metadata mismatches by deleting the stored copy or patching it
    #[arg(long)]
    pub on_mismatch: Option<MismatchMode>,

    /// Perform the changes (otherwise only report them)
    #[arg(long)]
    pub execute: bool,

    /// Upload files without catalog metadata
    #[arg(long)]
    pub no_metadata: bool,
}

pub fn run(args: SyncArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    super::setup_signal_handler()?;

    // Configuration and local state first: nothing remote is touched if these fail
    let catalog_path = resolve_catalog_path(
        args.catalog.as_deref(),
        &config.paths.prepared_dir,
        config.paths.legacy_catalog.as_deref(),
    )
    .context("No catalog to synchronize")?;
    let catalog = load_catalog(&catalog_path).context("Failed to load catalog")?;
    let loaded = catalog.publications.len();
    let publications = deduplicate(catalog.publications).publications;
    if publications.len() < loaded {
        log::warn!(
            "Catalog was not fully deduplicated: {} records dropped",
            loaded - publications.len()
        );
    }

    let dir = args
        .dir
        .unwrap_or_else(|| config.paths.documents_dir.clone());
    let local_options = LocalOptions {
        extension: config.upload.extension.clone(),
        max_file_size: args.max_file_size.unwrap_or(config.upload.max_file_size),
    };
    let pb = progress.stage_line("local");
    pb.set_message(format!("scanning {}", dir.display()));
    let local = LocalInventory::scan(&dir, &publications, &local_options)
        .with_context(|| format!("Cannot scan documents directory {}", dir.display()))?;
    pb.finish_with_message(format!("{} files available", fmt_num(local.counts.available)));

    let client = super::store_client(config, args.base_url.as_deref());
    if let Err(e) = check_connection(&client) {
        log::error!("Cannot connect to {}: {e}", client.base_url());
        return Ok(ExitCode::from(EXIT_CONNECT));
    }

    let pb = progress.stage_line("remote");
    let fetch_options = FetchOptions {
        page_size: config.remote.page_size,
        page_delay: Duration::from_millis(config.remote.page_delay_ms),
    };
    let remote = match fetch_inventory(&client, fetch_options, &pb) {
        Ok(remote) => remote,
        Err(e) => {
            log::error!("Cannot list documents on {}: {e}", client.base_url());
            return Ok(ExitCode::from(EXIT_CONNECT));
        }
    };
    pb.finish_with_message(format!("{} documents", fmt_num(remote.len())));
    if !remote.complete {
        log::warn!(
            "Remote listing incomplete: uploads will be held, orphans on unread pages go unreported"
        );
    }

    if is_shutdown_requested() {
        log::warn!("Interrupted before any action was taken");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }

    let reconciliation = reconcile(&publications, &local, &remote);
    for decision in reconciliation.needing_review() {
        log::warn!("Review: {} matched by title only", decision.label());
    }

    let collection = match args.collection.or_else(|| config.remote.collection.clone()) {
        Some(name) => Some(
            client
                .resolve_collection(&name)
                .with_context(|| format!("Cannot resolve collection '{name}'"))?,
        ),
        None => None,
    };

    let options = ExecuteOptions {
        execute: args.execute,
        max_upload: args.max_upload.unwrap_or(config.upload.max_upload),
        target: args.target,
        collection,
        include_metadata: !args.no_metadata,
        on_mismatch: args.on_mismatch.unwrap_or(config.upload.on_mismatch),
        hold_uploads: !remote.complete,
    };
    log::info!(
        "Target: {}, {} (max {} uploads, mismatches: {})",
        options.target,
        if options.is_live() { "executing" } else { "dry run" },
        options.max_upload,
        options.on_mismatch
    );
    let pb = progress.item_bar("actions", 0);
    let report = execute(&client, &reconciliation.decisions, &options, shutdown_flag(), &pb);
    pb.finish_and_clear();

    for (item, error) in &report.failures {
        log::error!("Failed: {item}: {error}");
    }

    let summary = SyncSummary::new(publications.len(), local.counts, &remote, &reconciliation, &report);
    if progress.is_tty() {
        eprintln!("\n{}", summary.format_table());
    } else {
        summary.log();
    }

    Ok(if report.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.failed() > 0 || report.held > 0 {
        ExitCode::from(EXIT_PARTIAL)
    } else {
        ExitCode::SUCCESS
    })
}
