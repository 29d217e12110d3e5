//! End-of-run summary for `halsync sync`.

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use halsync_core::fmt_num;

use crate::executor::ExecutionReport;
use crate::local::LocalCounts;
use crate::reconcile::{Action, Reconciliation};
use crate::remote::RemoteInventory;

/// Counts per category for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub catalog_entries: usize,
    pub local: LocalCounts,
    pub remote_documents: usize,
    /// Remote records dropped as unreadable
    pub remote_dropped: usize,
    /// Listing stopped early; uploads were held and orphans on unread pages
    /// are not reported
    pub remote_partial: bool,
    /// Upload and retry decisions
    pub uploadable: usize,
    pub skipped: usize,
    pub orphans: usize,
    pub mismatches: usize,
    pub needs_review: usize,
    pub live: bool,
    pub uploaded: usize,
    pub deleted: usize,
    pub updated: usize,
    pub failed: usize,
    pub deferred: usize,
    pub held: usize,
    pub would_upload: usize,
    pub would_delete: usize,
    pub would_update: usize,
    pub interrupted: bool,
}

impl SyncSummary {
    pub fn new(
        catalog_entries: usize,
        local: LocalCounts,
        remote: &RemoteInventory,
        reconciliation: &Reconciliation<'_>,
        report: &ExecutionReport,
    ) -> Self {
        Self {
            catalog_entries,
            local,
            remote_documents: remote.len(),
            remote_dropped: remote.dropped,
            remote_partial: !remote.complete,
            uploadable: reconciliation.count(Action::Upload) + reconciliation.count(Action::RetryFailed),
            skipped: reconciliation.count(Action::Skip),
            orphans: reconciliation.count(Action::Orphan),
            mismatches: reconciliation.count(Action::MetadataMismatch),
            needs_review: reconciliation.needing_review().count(),
            live: report.live,
            uploaded: report.uploaded,
            deleted: report.deleted,
            updated: report.updated,
            failed: report.failed(),
            deferred: report.deferred,
            held: report.held,
            would_upload: report.would_upload,
            would_delete: report.would_delete,
            would_update: report.would_update,
            interrupted: report.interrupted,
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Catalog entries", fmt_num(self.catalog_entries)),
            ("Local files available", fmt_num(self.local.available)),
            ("Missing files", fmt_num(self.local.missing)),
            ("Oversized files", fmt_num(self.local.oversized)),
            ("Wrong type files", fmt_num(self.local.wrong_type)),
            ("Without fulltext", fmt_num(self.local.no_fulltext)),
        ];
        let remote = if self.remote_partial {
            format!("{} (listing incomplete)", fmt_num(self.remote_documents))
        } else {
            fmt_num(self.remote_documents)
        };
        rows.push(("Documents on remote", remote));
        if self.remote_dropped > 0 {
            rows.push(("Unreadable remote records", fmt_num(self.remote_dropped)));
        }
        rows.extend([
            ("Uploadable", fmt_num(self.uploadable)),
            ("Skipped", fmt_num(self.skipped)),
            ("Orphans", fmt_num(self.orphans)),
            ("Metadata mismatches", fmt_num(self.mismatches)),
            ("Needs review", fmt_num(self.needs_review)),
        ]);
        if self.live {
            rows.extend([
                ("Uploaded", fmt_num(self.uploaded)),
                ("Deleted", fmt_num(self.deleted)),
                ("Updated", fmt_num(self.updated)),
                ("Deferred", fmt_num(self.deferred)),
                ("Failed", fmt_num(self.failed)),
            ]);
        } else {
            rows.extend([
                ("Would upload", fmt_num(self.would_upload)),
                ("Would delete", fmt_num(self.would_delete)),
                ("Would update", fmt_num(self.would_update)),
            ]);
        }
        if self.held > 0 {
            rows.push(("Held (partial listing)", fmt_num(self.held)));
        }
        if self.interrupted {
            rows.push(("Interrupted", "yes".to_string()));
        }
        rows
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new(if self.live { "Sync" } else { "Sync (dry run)" })
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        for (label, value) in self.rows() {
            let value = match label {
                "Failed" if self.failed > 0 => Cell::new(value).fg(Color::Red),
                "Held (partial listing)" => Cell::new(value).fg(Color::Yellow),
                "Needs review" if self.needs_review > 0 => Cell::new(value).fg(Color::Yellow),
                _ => Cell::new(value),
            };
            table.add_row(vec![Cell::new(label), value]);
        }
        table.to_string()
    }

    /// Log summary lines (non-TTY mode).
    pub fn log(&self) {
        for (label, value) in self.rows() {
            log::info!("{label}: {value}");
        }
    }
}
