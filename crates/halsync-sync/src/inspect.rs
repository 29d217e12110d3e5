//! Read-only reports over the remote inventory.

use std::collections::BTreeMap;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use halsync_catalog::normalize_title;
use halsync_core::fmt_num;

use crate::remote::{RemoteDocument, RemoteInventory};

/// Documents sharing one key.
pub type Group<'a> = (String, Vec<&'a RemoteDocument>);

/// Store-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overview {
    pub documents: usize,
    pub total_bytes: u64,
    pub by_ingestion: BTreeMap<String, usize>,
    pub by_extraction: BTreeMap<String, usize>,
    /// Documents with no external id in their metadata
    pub without_hal_id: usize,
}

pub fn overview(remote: &RemoteInventory) -> Overview {
    let mut out = Overview {
        documents: remote.len(),
        ..Default::default()
    };
    for doc in &remote.documents {
        out.total_bytes += doc.size_in_bytes.unwrap_or(0);
        *out.by_ingestion
            .entry(doc.ingestion_status.to_string())
            .or_default() += 1;
        *out.by_extraction
            .entry(doc.extraction_status.to_string())
            .or_default() += 1;
        if doc.hal_id().is_none() {
            out.without_hal_id += 1;
        }
    }
    out
}

/// Documents whose title is empty or a single word.
pub fn short_titles(remote: &RemoteInventory) -> Vec<&RemoteDocument> {
    remote
        .documents
        .iter()
        .filter(|d| d.title.split_whitespace().nth(1).is_none())
        .collect()
}

/// Documents whose ingestion did not (yet) succeed.
pub fn failed_ingestions(remote: &RemoteInventory) -> Vec<&RemoteDocument> {
    remote
        .documents
        .iter()
        .filter(|d| !d.ingestion_status.is_success())
        .collect()
}

fn repeated<'a>(
    remote: &'a RemoteInventory,
    key: impl Fn(&RemoteDocument) -> Option<String>,
) -> Vec<Group<'a>> {
    let mut groups: BTreeMap<String, Vec<&RemoteDocument>> = BTreeMap::new();
    for doc in &remote.documents {
        if let Some(k) = key(doc) {
            groups.entry(k).or_default().push(doc);
        }
    }
    groups.into_iter().filter(|(_, docs)| docs.len() > 1).collect()
}

/// Groups of documents storing the same external id.
pub fn repeated_hal_ids(remote: &RemoteInventory) -> Vec<Group<'_>> {
    repeated(remote, |d| d.hal_id().map(str::to_string))
}

/// Groups of documents whose titles normalize to the same text.
pub fn repeated_titles(remote: &RemoteInventory) -> Vec<Group<'_>> {
    repeated(remote, |d| {
        let key = normalize_title(d.title_stem());
        (!key.is_empty()).then_some(key)
    })
}

fn styled(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

impl Overview {
    pub fn format_table(&self) -> String {
        let mut table = styled(&["Store", "Value"]);
        table.add_row(vec![Cell::new("Documents"), Cell::new(fmt_num(self.documents))]);
        table.add_row(vec![
            Cell::new("Total size"),
            Cell::new(format!("{:.1} MB", self.total_bytes as f64 / 1_000_000.0)),
        ]);
        table.add_row(vec![
            Cell::new("Without external id"),
            Cell::new(fmt_num(self.without_hal_id)),
        ]);
        for (status, n) in &self.by_ingestion {
            table.add_row(vec![Cell::new(format!("Ingestion: {status}")), Cell::new(fmt_num(*n))]);
        }
        for (status, n) in &self.by_extraction {
            table.add_row(vec![Cell::new(format!("Extraction: {status}")), Cell::new(fmt_num(*n))]);
        }
        table.to_string()
    }
}

/// One row per document.
pub fn documents_table(docs: &[&RemoteDocument]) -> String {
    let mut table = styled(&["Id", "External id", "Ingestion", "Title"]);
    for doc in docs {
        table.add_row(vec![
            Cell::new(&doc.id),
            Cell::new(doc.hal_id().unwrap_or("-")),
            Cell::new(doc.ingestion_status.as_str()),
            Cell::new(&doc.title),
        ]);
    }
    table.to_string()
}

/// One row per group, listing member ids.
pub fn groups_table(key_header: &str, groups: &[Group<'_>]) -> String {
    let mut table = styled(&[key_header, "Count", "Documents"]);
    for (key, docs) in groups {
        let ids: Vec<String> = docs
            .iter()
            .map(|d| format!("{} ({})", d.id, d.ingestion_status))
            .collect();
        table.add_row(vec![
            Cell::new(key),
            Cell::new(docs.len()),
            Cell::new(ids.join("\n")),
        ]);
    }
    table.to_string()
}

/// Field/value view of a single document.
pub fn document_table(doc: &RemoteDocument) -> String {
    let mut table = styled(&["Field", "Value"]);
    let opt = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    table.add_row(vec![Cell::new("Id"), Cell::new(&doc.id)]);
    table.add_row(vec![Cell::new("Title"), Cell::new(&doc.title)]);
    table.add_row(vec![
        Cell::new("Size"),
        Cell::new(opt(doc.size_in_bytes.map(|n| fmt_num(n as usize)))),
    ]);
    table.add_row(vec![Cell::new("Ingestion"), Cell::new(doc.ingestion_status.as_str())]);
    table.add_row(vec![Cell::new("Extraction"), Cell::new(doc.extraction_status.as_str())]);
    table.add_row(vec![
        Cell::new("Created"),
        Cell::new(opt(doc.created_at.map(|t| t.to_rfc3339()))),
    ]);
    table.add_row(vec![
        Cell::new("Updated"),
        Cell::new(opt(doc.updated_at.map(|t| t.to_rfc3339()))),
    ]);
    for (column, value) in &doc.columns {
        table.add_row(vec![Cell::new(column), Cell::new(value)]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::IngestionStatus;
    use serde_json::json;

    fn inventory() -> RemoteInventory {
        let records = [
            json!({"id": "a", "title": "Carbon pricing", "size_in_bytes": 100,
                   "ingestion_status": "success", "metadata": {"hal_id": "hal-1"}}),
            json!({"id": "b", "title": "carbon  pricing.pdf", "size_in_bytes": 50,
                   "ingestion_status": "failed", "metadata": {"hal_id": "hal-1"}}),
            json!({"id": "c", "title": "Report", "ingestion_status": "pending"}),
            json!({"id": "d", "title": "", "ingestion_status": "success",
                   "metadata": {"hal_id": "hal-2"}}),
        ];
        RemoteInventory::from_documents(
            records
                .into_iter()
                .map(|r| RemoteDocument::from_record(r).unwrap())
                .collect(),
        )
    }

    #[test]
    fn overview_counts() {
        let o = overview(&inventory());
        assert_eq!(o.documents, 4);
        assert_eq!(o.total_bytes, 150);
        assert_eq!(o.by_ingestion["success"], 2);
        assert_eq!(o.by_ingestion["pending"], 1);
        assert_eq!(o.by_extraction["unknown"], 4);
        assert_eq!(o.without_hal_id, 1);
    }

    #[test]
    fn short_and_failed() {
        let inv = inventory();
        let short: Vec<_> = short_titles(&inv).iter().map(|d| d.id.as_str()).collect();
        assert_eq!(short, vec!["c", "d"]);
        let failed: Vec<_> = failed_ingestions(&inv).iter().map(|d| d.id.as_str()).collect();
        assert_eq!(failed, vec!["b", "c"]);
        assert!(failed_ingestions(&inv)
            .iter()
            .all(|d| d.ingestion_status != IngestionStatus::Success));
    }

    #[test]
    fn repeated_groups() {
        let inv = inventory();
        let ids = repeated_hal_ids(&inv);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].0, "hal-1");
        assert_eq!(ids[0].1.len(), 2);

        let titles = repeated_titles(&inv);
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].0, "carbon pricing");
        assert!(groups_table("Title", &titles).contains("carbon pricing"));
    }
}
