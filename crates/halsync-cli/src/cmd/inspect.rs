//! `halsync inspect` - read-only reports on the remote store

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use halsync_core::SharedProgress;
use halsync_sync::inspect::{
    document_table, documents_table, failed_ingestions, groups_table, overview, repeated_hal_ids,
    repeated_titles, short_titles,
};
use halsync_sync::{
    DocumentStore, FetchOptions, RemoteDocument, RemoteInventory, check_connection,
    fetch_inventory,
};

use super::EXIT_CONNECT;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub what: InspectWhat,

    /// Remote store API endpoint
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum InspectWhat {
    /// Counts by ingestion and extraction status
    Overview,
    /// Documents with an empty or one-word title
    ShortTitles,
    /// Documents whose ingestion has not succeeded
    FailedIngestions,
    /// Documents sharing a stored external id
    RepeatHalid,
    /// Documents sharing a normalized title
    RepeatTitles,
    /// Every report above
    All,
    /// One document as the store returns it
    Document {
        /// Document id in the store
        #[arg(long)]
        id: String,
    },
}

pub fn run(args: InspectArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let client = super::store_client(config, args.base_url.as_deref());
    if let Err(e) = check_connection(&client) {
        log::error!("Cannot connect to {}: {e}", client.base_url());
        return Ok(ExitCode::from(EXIT_CONNECT));
    }
    if let InspectWhat::Document { id } = &args.what {
        show_document(&client, id)?;
        return Ok(ExitCode::SUCCESS);
    }

    let pb = progress.stage_line("remote");
    let options = FetchOptions {
        page_size: config.remote.page_size,
        page_delay: Duration::from_millis(config.remote.page_delay_ms),
    };
    let remote = match fetch_inventory(&client, options, &pb) {
        Ok(remote) => remote,
        Err(e) => {
            log::error!("Cannot list documents on {}: {e}", client.base_url());
            return Ok(ExitCode::from(EXIT_CONNECT));
        }
    };
    pb.finish_and_clear();

    report(&args.what, &remote);
    Ok(ExitCode::SUCCESS)
}

fn report(what: &InspectWhat, remote: &RemoteInventory) {
    let all = *what == InspectWhat::All;
    let wants = |one: InspectWhat| all || *what == one;
    if wants(InspectWhat::Overview) {
        eprintln!("\n{}", overview(remote).format_table());
    }
    if wants(InspectWhat::ShortTitles) {
        let docs = short_titles(remote);
        eprintln!("\nShort titles: {}", docs.len());
        if !docs.is_empty() {
            eprintln!("{}", documents_table(&docs));
        }
    }
    if wants(InspectWhat::FailedIngestions) {
        let docs = failed_ingestions(remote);
        eprintln!("\nNot successfully ingested: {}", docs.len());
        if !docs.is_empty() {
            eprintln!("{}", documents_table(&docs));
        }
    }
    if wants(InspectWhat::RepeatHalid) {
        let groups = repeated_hal_ids(remote);
        eprintln!("\nRepeated external ids: {}", groups.len());
        if !groups.is_empty() {
            eprintln!("{}", groups_table("External id", &groups));
        }
    }
    if wants(InspectWhat::RepeatTitles) {
        let groups = repeated_titles(remote);
        eprintln!("\nRepeated titles: {}", groups.len());
        if !groups.is_empty() {
            eprintln!("{}", groups_table("Title", &groups));
        }
    }
}

fn show_document(store: &dyn DocumentStore, id: &str) -> Result<()> {
    let record = store
        .retrieve(id)
        .with_context(|| format!("Cannot retrieve document {id}"))?;
    let doc = RemoteDocument::from_record(record)
        .with_context(|| format!("Cannot read document {id}"))?;
    eprintln!("\n{}", document_table(&doc));
    Ok(())
}
