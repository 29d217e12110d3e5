//! `halsync prepare` - raw source response to prepared catalog snapshot

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use halsync_catalog::{
    PrepareOptions, RAW_RESPONSE_PATTERN, latest_matching, load_blacklist, prepare, read_snapshot,
    write_prepared,
};
use halsync_core::{SharedProgress, fmt_num};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Raw response file (default: latest hal_response_*.json in the raw directory)
    #[arg(long)]
    pub raw_file: Option<PathBuf>,

    /// Directory holding raw responses
    #[arg(long)]
    pub raw_dir: Option<PathBuf>,

    /// Where to write the prepared snapshot
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Blacklist file ({"excluded_hal_ids": [...]})
    #[arg(long)]
    pub blacklist: Option<PathBuf>,

    /// Lab acronym; records that cite it without the lab affiliation are set
    /// aside as homonymous conference communications
    #[arg(long)]
    pub lab_acronym: Option<String>,
}

pub fn run(args: PrepareArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let raw_dir = args.raw_dir.unwrap_or_else(|| config.paths.raw_dir.clone());
    let raw_file = match args.raw_file {
        Some(path) => path,
        None => latest_matching(&raw_dir, RAW_RESPONSE_PATTERN).with_context(|| {
            format!("No {RAW_RESPONSE_PATTERN} found in {}", raw_dir.display())
        })?,
    };
    let output = args
        .output
        .unwrap_or_else(|| config.paths.prepared_dir.clone());
    let blacklist_path = args
        .blacklist
        .unwrap_or_else(|| config.paths.blacklist.clone());

    log::info!("Preparing catalog from {}", raw_file.display());
    let pb = progress.stage_line("prepare");
    pb.set_message("reading raw response");

    let raw = read_snapshot(&raw_file).context("Failed to read raw response")?;
    if raw.publications.is_empty() {
        anyhow::bail!("{} holds no records", raw_file.display());
    }
    let blacklist = load_blacklist(&blacklist_path).context("Failed to read blacklist")?;
    if !blacklist.is_empty() {
        log::info!("Blacklist: {} external ids", blacklist.len());
    }

    pb.set_message(format!("deduplicating {} records", fmt_num(raw.publications.len())));
    let source_file = raw_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let options = PrepareOptions {
        blacklist,
        lab_acronym: args.lab_acronym.or_else(|| config.catalog.lab_acronym.clone()),
    };
    let prepared = prepare(
        raw.publications,
        &options,
        &source_file,
        chrono::Local::now().naive_local(),
    );
    let path = write_prepared(&output, &prepared).context("Failed to write prepared catalog")?;
    pb.finish_and_clear();

    let stats = prepared.filtering_statistics;
    if !stats.is_consistent() {
        log::warn!("Filtering counters do not add up");
    }
    super::print_summary(
        progress,
        "Prepare",
        &[
            ("Retrieved", fmt_num(stats.total_retrieved)),
            ("Conference homonyms", fmt_num(stats.conference_excluded)),
            ("Blacklisted", fmt_num(stats.blacklisted_excluded)),
            ("Without fulltext", fmt_num(stats.no_open_access_excluded)),
            ("Working papers", fmt_num(stats.working_papers_excluded)),
            ("DOI duplicates", fmt_num(stats.doi_duplicates_excluded)),
            ("Book/chapter kept", fmt_num(stats.book_chapter_exempted)),
            ("Final", fmt_num(stats.final_count)),
            ("Written to", path.display().to_string()),
        ],
    );
    Ok(ExitCode::SUCCESS)
}
