//! Carry out reconciliation decisions against the store.
//!
//! Dry run unless `execute` is set and the upload budget is positive.
//! Per-item failures are recorded and the batch continues.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;
use serde::Deserialize;

use crate::reconcile::{Action, Decision, Target};
use crate::store::{DocumentStore, StoreError};

/// How a metadata mismatch is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchMode {
    /// Delete the stored copy; the next run uploads it again
    #[default]
    Delete,
    /// Patch the differing fields in place
    Update,
}

impl MismatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }
}

impl FromStr for MismatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(Self::Delete),
            "update" => Ok(Self::Update),
            other => Err(format!("unknown mismatch mode '{other}' (expected delete or update)")),
        }
    }
}

impl fmt::Display for MismatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution settings.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Perform mutations (otherwise only log them)
    pub execute: bool,
    /// Successful creates allowed this run; 0 forces a dry run
    pub max_upload: usize,
    pub target: Target,
    /// Collection id assigned to uploads
    pub collection: Option<String>,
    /// Send catalog metadata with uploads
    pub include_metadata: bool,
    pub on_mismatch: MismatchMode,
    /// The remote listing is partial: a create could duplicate a document
    /// on an unread page, so uploads and retries are reported but not sent
    pub hold_uploads: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            execute: false,
            max_upload: 5,
            target: Target::All,
            collection: None,
            include_metadata: true,
            on_mismatch: MismatchMode::Delete,
            hold_uploads: false,
        }
    }
}

impl ExecuteOptions {
    /// Whether any remote call may mutate state.
    pub fn is_live(&self) -> bool {
        self.execute && self.max_upload > 0
    }
}

/// Outcome of one executor pass.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub live: bool,
    /// Selected decisions walked
    pub considered: usize,
    pub uploaded: usize,
    pub deleted: usize,
    /// Documents whose metadata was patched
    pub updated: usize,
    /// Upload candidates left for a later run once the budget was spent
    pub deferred: usize,
    /// Upload candidates withheld because the remote listing was partial
    pub held: usize,
    /// Dry run: calls that would have been issued
    pub would_upload: usize,
    pub would_delete: usize,
    pub would_update: usize,
    /// `(item, error)` for every failed call
    pub failures: Vec<(String, String)>,
    /// Stopped early on a shutdown request
    pub interrupted: bool,
}

impl ExecutionReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

fn upload_metadata(decision: &Decision<'_>, options: &ExecuteOptions) -> BTreeMap<String, String> {
    match (&decision.expected, options.include_metadata) {
        (Some(expected), true) => expected.to_upload_map(),
        _ => BTreeMap::new(),
    }
}

/// Catalog values of the fields that differ. Fields the catalog leaves
/// empty cannot be patched and are left out.
fn mismatch_patch(decision: &Decision<'_>) -> BTreeMap<String, String> {
    let Some(expected) = &decision.expected else {
        return BTreeMap::new();
    };
    decision
        .mismatched
        .iter()
        .filter_map(|&field| expected.get(field).map(|v| (field.key().to_string(), v.to_string())))
        .collect()
}

fn create(
    store: &dyn DocumentStore,
    decision: &Decision<'_>,
    options: &ExecuteOptions,
) -> Result<String, StoreError> {
    let Some(file) = decision.local else {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no local file",
        )));
    };
    store.create(
        &file.path,
        &upload_metadata(decision, options),
        options.collection.as_deref(),
    )
}

/// Walk the decisions selected by `options.target` and apply them.
///
/// `stop` is checked between items; already applied calls are not undone.
pub fn execute(
    store: &dyn DocumentStore,
    decisions: &[Decision<'_>],
    options: &ExecuteOptions,
    stop: &AtomicBool,
    pb: &ProgressBar,
) -> ExecutionReport {
    let live = options.is_live();
    let mut report = ExecutionReport {
        live,
        ..Default::default()
    };
    if options.execute && !live {
        log::warn!("Upload budget is 0: running as a dry run");
    }
    if options.hold_uploads {
        log::warn!("Remote listing is partial: uploads are held until a complete listing");
    }

    let selected: Vec<&Decision<'_>> = decisions
        .iter()
        .filter(|d| options.target.selects(d.action))
        .collect();
    pb.set_length(selected.len() as u64);

    for decision in selected {
        if stop.load(Ordering::Relaxed) {
            log::warn!("Shutdown requested, stopping before {}", decision.label());
            report.interrupted = true;
            break;
        }
        report.considered += 1;
        pb.set_message(decision.label());

        match decision.action {
            Action::Upload | Action::RetryFailed => {
                if options.hold_uploads {
                    log::info!(
                        "Holding {} {}: remote listing is partial",
                        decision.action,
                        decision.label()
                    );
                    report.held += 1;
                } else if !live {
                    log::info!("[dry-run] would {} {}", decision.action, decision.label());
                    report.would_upload += 1;
                    if decision.action == Action::RetryFailed {
                        report.would_delete += 1;
                    }
                } else if report.uploaded >= options.max_upload {
                    log::debug!("Upload budget spent, deferring {}", decision.label());
                    report.deferred += 1;
                } else {
                    apply_upload(store, decision, options, &mut report);
                }
            }
            Action::MetadataMismatch if options.on_mismatch == MismatchMode::Update => {
                if let Some(doc) = decision.remote {
                    apply_update(store, decision, &doc.id, live, &mut report);
                }
            }
            Action::Orphan | Action::MetadataMismatch => {
                if let Some(doc) = decision.remote {
                    apply_delete(store, decision, &doc.id, live, &mut report);
                }
            }
            Action::Skip => {}
        }
        pb.inc(1);
    }

    if report.deferred > 0 {
        log::info!(
            "Reached upload limit of {}: {} uploads deferred to a later run",
            options.max_upload,
            report.deferred
        );
    }
    if !live {
        log::info!("Dry run: nothing changed. Use --execute with a positive --max-upload to apply.");
    }
    report
}

fn apply_delete(
    store: &dyn DocumentStore,
    decision: &Decision<'_>,
    id: &str,
    live: bool,
    report: &mut ExecutionReport,
) {
    if !live {
        log::info!("[dry-run] would delete {} ({})", decision.label(), decision.action);
        report.would_delete += 1;
        return;
    }
    match store.delete(id) {
        Ok(()) => {
            log::info!("Deleted {} ({})", decision.label(), decision.action);
            report.deleted += 1;
        }
        Err(e) => {
            log::error!("Failed to delete {}: {e}", decision.label());
            report.failures.push((decision.label(), e.to_string()));
        }
    }
}

/// Patch the differing fields of one stored document and account.
fn apply_update(
    store: &dyn DocumentStore,
    decision: &Decision<'_>,
    id: &str,
    live: bool,
    report: &mut ExecutionReport,
) {
    let patch = mismatch_patch(decision);
    if patch.is_empty() {
        log::info!(
            "{}: differing fields are empty in the catalog, nothing to patch",
            decision.label()
        );
        return;
    }
    let fields = patch.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
    if !live {
        log::info!("[dry-run] would update {} ({fields})", decision.label());
        report.would_update += 1;
        return;
    }
    match store.append_metadata(id, &patch) {
        Ok(()) => {
            log::info!("Updated {} ({fields})", decision.label());
            report.updated += 1;
        }
        Err(e) => {
            log::error!("Failed to update {}: {e}", decision.label());
            report.failures.push((decision.label(), e.to_string()));
        }
    }
}

/// Create (after removing the failed copy, for retries) and account.
fn apply_upload(
    store: &dyn DocumentStore,
    decision: &Decision<'_>,
    options: &ExecuteOptions,
    report: &mut ExecutionReport,
) {
    if decision.action == Action::RetryFailed {
        if let Some(doc) = decision.remote {
            log::warn!("Re-uploading {} after failed ingestion", decision.label());
            if let Err(e) = store.delete(&doc.id) {
                log::error!("Failed to delete failed copy of {}: {e}", decision.label());
                report.failures.push((decision.label(), e.to_string()));
                return;
            }
            report.deleted += 1;
        }
    }
    match create(store, decision, options) {
        Ok(id) => {
            log::info!("Uploaded {} as {id}", decision.label());
            report.uploaded += 1;
        }
        Err(e) => {
            log::error!("Failed to upload {}: {e}", decision.label());
            report.failures.push((decision.label(), e.to_string()));
        }
    }
}
