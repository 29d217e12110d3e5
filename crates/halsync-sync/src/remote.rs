//! Remote inventory: every document in the store, with flattened metadata,
//! indexed by the external id stored in that metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use halsync_core::fmt_num;
use indicatif::ProgressBar;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::metadata::{DocumentMetadata, MetadataError, flatten_metadata};
use crate::store::{DocumentStore, StoreError};

/// Ingestion state reported by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IngestionStatus {
    Success,
    Failed,
    /// Any other state (pending, parsing, embedding, ...)
    Other(String),
    /// Not reported
    #[default]
    Unknown,
}

impl IngestionStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Unknown,
            Some(s) if s.eq_ignore_ascii_case("success") => Self::Success,
            Some(s) if s.eq_ignore_ascii_case("failed") => Self::Failed,
            Some(s) => Self::Other(s.to_ascii_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Other(s) => s,
            Self::Unknown => "unknown",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote record that could not be read.
#[derive(Debug)]
pub enum RecordError {
    /// Missing id or fields of the wrong type
    Shape(String),
    Metadata(MetadataError),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(msg) => write!(f, "malformed document record: {msg}"),
            Self::Metadata(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<MetadataError> for RecordError {
    fn from(e: MetadataError) -> Self {
        Self::Metadata(e)
    }
}

/// Wire form of a listed document.
#[derive(Debug, Deserialize)]
struct RawDocument {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    size_in_bytes: Option<u64>,
    #[serde(default)]
    ingestion_status: Option<String>,
    #[serde(default)]
    extraction_status: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    metadata: Value,
}

/// One document in the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub title: String,
    pub size_in_bytes: Option<u64>,
    pub ingestion_status: IngestionStatus,
    pub extraction_status: IngestionStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Flattened `meta_*` columns
    pub columns: BTreeMap<String, String>,
    pub metadata: DocumentMetadata,
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

impl RemoteDocument {
    /// Decode one listed record.
    pub fn from_record(record: Value) -> Result<Self, RecordError> {
        let raw: RawDocument =
            serde_json::from_value(record).map_err(|e| RecordError::Shape(e.to_string()))?;
        let columns = flatten_metadata(&raw.metadata)?;
        let metadata = DocumentMetadata::from_columns(&columns);
        Ok(Self {
            id: raw.id,
            title: raw.title.unwrap_or_default(),
            size_in_bytes: raw.size_in_bytes,
            ingestion_status: IngestionStatus::parse(raw.ingestion_status.as_deref()),
            extraction_status: IngestionStatus::parse(raw.extraction_status.as_deref()),
            created_at: parse_timestamp(raw.created_at.as_deref()),
            updated_at: parse_timestamp(raw.updated_at.as_deref()),
            columns,
            metadata,
        })
    }

    /// External id stored in the metadata.
    pub fn hal_id(&self) -> Option<&str> {
        self.metadata.hal_id.as_deref()
    }

    /// Title with a trailing `.pdf` removed, as stored when a file was
    /// uploaded without metadata.
    pub fn title_stem(&self) -> &str {
        let title = self.title.trim();
        match title.len().checked_sub(4) {
            Some(cut) if title.is_char_boundary(cut) && title[cut..].eq_ignore_ascii_case(".pdf") => {
                &title[..cut]
            }
            _ => title,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self.hal_id() {
            Some(hal_id) => format!("{} ({hal_id})", self.id),
            None if !self.title.is_empty() => format!("{} ({})", self.id, self.title),
            None => self.id.clone(),
        }
    }
}

/// `a` should be preferred over `b` as the representative of an external id.
fn preferred(a: &RemoteDocument, b: &RemoteDocument) -> bool {
    match (a.ingestion_status.is_success(), b.ingestion_status.is_success()) {
        (true, false) => true,
        (false, true) => false,
        _ => a.updated_at > b.updated_at,
    }
}

/// All documents in the store plus an index by external id.
#[derive(Debug, Clone, Default)]
pub struct RemoteInventory {
    pub documents: Vec<RemoteDocument>,
    by_hal_id: FxHashMap<String, usize>,
    /// Records dropped because they could not be decoded
    pub dropped: usize,
    /// False when pagination stopped on an error
    pub complete: bool,
}

impl RemoteInventory {
    /// Build the index. When several documents carry the same external id,
    /// the successfully ingested one wins, then the most recently updated.
    pub fn from_documents(documents: Vec<RemoteDocument>) -> Self {
        let mut by_hal_id: FxHashMap<String, usize> = FxHashMap::default();
        for (i, doc) in documents.iter().enumerate() {
            let Some(hal_id) = doc.hal_id() else {
                continue;
            };
            match by_hal_id.get(hal_id).copied() {
                None => {
                    by_hal_id.insert(hal_id.to_string(), i);
                }
                Some(current) => {
                    let keep = if preferred(doc, &documents[current]) { i } else { current };
                    let other = if keep == i { current } else { i };
                    log::warn!(
                        "{hal_id} stored more than once: using {}, ignoring {}",
                        documents[keep].id,
                        documents[other].id
                    );
                    by_hal_id.insert(hal_id.to_string(), keep);
                }
            }
        }
        Self {
            documents,
            by_hal_id,
            dropped: 0,
            complete: true,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Index of the representative document for an external id.
    pub fn position(&self, hal_id: &str) -> Option<usize> {
        self.by_hal_id.get(hal_id).copied()
    }

    pub fn get(&self, hal_id: &str) -> Option<&RemoteDocument> {
        self.position(hal_id).map(|i| &self.documents[i])
    }

    /// Number of distinct external ids in the index.
    pub fn indexed(&self) -> usize {
        self.by_hal_id.len()
    }
}

/// Pagination settings for [`fetch_inventory`].
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub page_size: usize,
    /// Pause between page requests
    pub page_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: 250,
            page_delay: Duration::ZERO,
        }
    }
}

/// Page through the whole store.
///
/// Stops on an empty page, a short page, or an error. An error on the first
/// page is returned; a later one keeps what was already fetched and marks
/// the inventory incomplete. Undecodable records are dropped one by one.
pub fn fetch_inventory(
    store: &dyn DocumentStore,
    options: FetchOptions,
    pb: &ProgressBar,
) -> Result<RemoteInventory, StoreError> {
    let page_size = options.page_size.max(1);
    let mut documents = Vec::new();
    let mut dropped = 0;
    let mut complete = true;
    let mut offset = 0;

    loop {
        let page = match store.list(page_size, offset) {
            Ok(page) => page,
            Err(e) if offset == 0 => return Err(e),
            Err(e) => {
                log::warn!("Listing stopped at offset {offset}: {e}; keeping {} documents", documents.len());
                complete = false;
                break;
            }
        };
        if page.results.is_empty() {
            break;
        }
        if let Some(total) = page.total_entries {
            pb.set_length(total);
        }

        let page_len = page.results.len();
        for record in page.results {
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<no id>")
                .to_string();
            match RemoteDocument::from_record(record) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    log::warn!("Dropping remote document {id}: {e}");
                    dropped += 1;
                }
            }
        }
        pb.set_position((offset + page_len) as u64);
        pb.set_message(format!("{} documents", fmt_num(documents.len())));

        if page_len < page_size {
            break;
        }
        offset += page_size;
        if !options.page_delay.is_zero() {
            std::thread::sleep(options.page_delay);
        }
    }

    let mut inventory = RemoteInventory::from_documents(documents);
    inventory.dropped = dropped;
    inventory.complete = complete;
    log::info!(
        "Remote store: {} documents, {} with an external id, {} dropped",
        fmt_num(inventory.len()),
        fmt_num(inventory.indexed()),
        dropped
    );
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, hal_id: &str, status: &str, updated: &str) -> RemoteDocument {
        RemoteDocument::from_record(json!({
            "id": id,
            "title": "T",
            "ingestion_status": status,
            "updated_at": updated,
            "metadata": {"hal_id": hal_id}
        }))
        .unwrap()
    }

    #[test]
    fn decodes_record_with_string_metadata() {
        let d = RemoteDocument::from_record(json!({
            "id": "9b2c",
            "title": "hal-01.pdf",
            "size_in_bytes": 1024,
            "ingestion_status": "SUCCESS",
            "extraction_status": "pending",
            "created_at": "2024-03-01T10:00:00.123456Z",
            "updated_at": "2024-03-02T10:00:00",
            "metadata": "{\"hal_id\": \"hal-01\", \"title\": \" \"}"
        }))
        .unwrap();
        assert_eq!(d.hal_id(), Some("hal-01"));
        assert_eq!(d.metadata.title, None);
        assert!(d.ingestion_status.is_success());
        assert_eq!(d.extraction_status, IngestionStatus::Other("pending".into()));
        assert!(d.created_at.is_some());
        assert!(d.updated_at.is_some());
        assert_eq!(d.title_stem(), "hal-01");
        assert_eq!(d.columns["meta_hal_id"], "hal-01");
    }

    #[test]
    fn missing_status_is_unknown() {
        let d = RemoteDocument::from_record(json!({"id": "x"})).unwrap();
        assert_eq!(d.ingestion_status, IngestionStatus::Unknown);
        assert_eq!(d.hal_id(), None);
    }

    #[test]
    fn record_without_id_rejected() {
        let err = RemoteDocument::from_record(json!({"title": "x"})).unwrap_err();
        assert!(matches!(err, RecordError::Shape(_)));
    }

    #[test]
    fn duplicate_prefers_success_then_latest() {
        let inv = RemoteInventory::from_documents(vec![
            doc("a", "hal-1", "failed", "2024-05-01T00:00:00Z"),
            doc("b", "hal-1", "success", "2024-01-01T00:00:00Z"),
            doc("c", "hal-1", "success", "2024-02-01T00:00:00Z"),
            doc("d", "hal-2", "success", "2024-02-01T00:00:00Z"),
        ]);
        assert_eq!(inv.get("hal-1").unwrap().id, "c");
        assert_eq!(inv.indexed(), 2);
        assert_eq!(inv.len(), 4);
    }

    #[test]
    fn title_stem_only_strips_pdf() {
        let mut d = RemoteDocument::default();
        d.title = "Report.PDF".into();
        assert_eq!(d.title_stem(), "Report");
        d.title = "Plain title".into();
        assert_eq!(d.title_stem(), "Plain title");
        d.title = "pdf".into();
        assert_eq!(d.title_stem(), "pdf");
    }
}
