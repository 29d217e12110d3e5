//! End-to-end pipeline tests against an in-memory document store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use halsync_catalog::{DocType, Publication};
use halsync_sync::{
    Action, DocumentMetadata, DocumentPage, DocumentStore, ExecuteOptions, ExecutionReport,
    FetchOptions, LocalInventory, LocalOptions, MetadataField, MismatchMode, RemoteInventory,
    StoreError, Target, execute, fetch_inventory, reconcile,
};
use indicatif::ProgressBar;
use serde_json::{Value, json};

const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\ntrailer\n%%EOF\n";

#[derive(Default)]
struct State {
    docs: Vec<Value>,
    next_id: usize,
    lists: usize,
    creates: usize,
    deletes: usize,
    patches: usize,
    /// File stems whose create fails
    fail_create: BTreeSet<String>,
    /// Listing at or past this offset fails
    fail_list_from: Option<usize>,
}

#[derive(Default)]
struct FakeStore {
    state: Mutex<State>,
}

fn unavailable() -> StoreError {
    StoreError::Http {
        status: Some(503),
        message: "unavailable".into(),
    }
}

impl FakeStore {
    fn with_docs(docs: Vec<Value>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().docs = docs;
        store
    }

    fn mutations(&self) -> (usize, usize) {
        let s = self.state.lock().unwrap();
        (s.creates, s.deletes)
    }

    fn stored_ids(&self) -> Vec<String> {
        let s = self.state.lock().unwrap();
        s.docs
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect()
    }
}

impl DocumentStore for FakeStore {
    fn list(&self, limit: usize, offset: usize) -> Result<DocumentPage, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.lists += 1;
        if s.fail_list_from.is_some_and(|from| offset >= from) {
            return Err(unavailable());
        }
        let end = (offset + limit).min(s.docs.len());
        let results = s.docs.get(offset..end).unwrap_or_default().to_vec();
        Ok(DocumentPage {
            results,
            total_entries: Some(s.docs.len() as u64),
        })
    }

    fn retrieve(&self, id: &str) -> Result<Value, StoreError> {
        let s = self.state.lock().unwrap();
        s.docs
            .iter()
            .find(|d| d["id"] == id)
            .cloned()
            .ok_or(StoreError::Http {
                status: Some(404),
                message: "not found".into(),
            })
    }

    fn create(
        &self,
        file: &Path,
        metadata: &BTreeMap<String, String>,
        _collection: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.creates += 1;
        let stem = file.file_stem().unwrap().to_string_lossy().into_owned();
        if s.fail_create.contains(&stem) {
            return Err(unavailable());
        }
        s.next_id += 1;
        let id = format!("doc-{}", s.next_id);
        s.docs.push(json!({
            "id": id,
            "title": file.file_name().unwrap().to_string_lossy(),
            "ingestion_status": "success",
            "metadata": metadata,
        }));
        Ok(id)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        s.deletes += 1;
        let before = s.docs.len();
        s.docs.retain(|d| d["id"] != id);
        if s.docs.len() == before {
            return Err(StoreError::Http {
                status: Some(404),
                message: "not found".into(),
            });
        }
        Ok(())
    }

    fn append_metadata(&self, id: &str, metadata: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        s.patches += 1;
        let Some(doc) = s.docs.iter_mut().find(|d| d["id"] == id) else {
            return Err(StoreError::Http {
                status: Some(404),
                message: "not found".into(),
            });
        };
        for (key, value) in metadata {
            doc["metadata"][key.as_str()] = json!(value);
        }
        Ok(())
    }
}

fn publication(hal_id: &str, title: &str) -> Publication {
    Publication {
        docid: 1,
        hal_id: hal_id.into(),
        titles: vec![title.into()],
        doc_type: DocType::Article,
        authors: vec!["Ann Author".into(), "Bob Writer".into()],
        file_main: Some(format!("https://hal.science/{hal_id}/document")),
        ..Default::default()
    }
}

/// Stored record carrying the metadata the catalog entry expects.
fn stored(id: &str, p: &Publication, status: &str) -> Value {
    json!({
        "id": id,
        "title": p.title(),
        "ingestion_status": status,
        "metadata": DocumentMetadata::from_publication(p).to_upload_map(),
    })
}

fn pdf_dir(ids: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for id in ids {
        std::fs::write(dir.path().join(format!("{id}.pdf")), PDF).unwrap();
    }
    dir
}

fn scan(dir: &Path, pubs: &[Publication]) -> LocalInventory {
    LocalInventory::scan(dir, pubs, &LocalOptions::default()).unwrap()
}

fn fetch(store: &FakeStore) -> RemoteInventory {
    fetch_inventory(store, FetchOptions::default(), &ProgressBar::hidden()).unwrap()
}

fn live(max_upload: usize) -> ExecuteOptions {
    ExecuteOptions {
        execute: true,
        max_upload,
        ..Default::default()
    }
}

fn run(
    store: &FakeStore,
    dir: &Path,
    pubs: &[Publication],
    options: &ExecuteOptions,
) -> ExecutionReport {
    let local = scan(dir, pubs);
    let remote = fetch(store);
    let rec = reconcile(pubs, &local, &remote);
    execute(store, &rec.decisions, options, &AtomicBool::new(false), &ProgressBar::hidden())
}

#[test]
fn local_file_without_remote_is_uploaded() {
    let pubs = vec![publication("hal-001234", "Carbon pricing")];
    let dir = pdf_dir(&["hal-001234"]);
    let store = FakeStore::default();

    let local = scan(dir.path(), &pubs);
    let remote = fetch(&store);
    let rec = reconcile(&pubs, &local, &remote);
    let d = rec.get("hal-001234").unwrap();
    assert_eq!(d.action, Action::Upload);
    assert_eq!(d.local.unwrap().path, dir.path().join("hal-001234.pdf"));
}

#[test]
fn remote_id_absent_from_catalog_is_orphan() {
    let pubs = vec![publication("hal-1", "Kept")];
    let store = FakeStore::with_docs(vec![
        stored("r1", &pubs[0], "success"),
        stored("r9", &publication("hal-999", "Gone"), "success"),
    ]);
    let local = LocalInventory::default();
    let remote = fetch(&store);
    let rec = reconcile(&pubs, &local, &remote);

    let orphans: Vec<_> = rec
        .decisions
        .iter()
        .filter(|d| d.action == Action::Orphan)
        .map(|d| d.remote.unwrap().id.clone())
        .collect();
    assert_eq!(orphans, vec!["r9"]);
}

#[test]
fn changed_title_is_metadata_mismatch() {
    let pubs = vec![publication("hal-1", "Catalog title")];
    let mut record = stored("r1", &pubs[0], "success");
    record["metadata"]["title"] = json!("Outdated title");
    let store = FakeStore::with_docs(vec![record]);
    let dir = pdf_dir(&["hal-1"]);

    let local = scan(dir.path(), &pubs);
    let remote = fetch(&store);
    let rec = reconcile(&pubs, &local, &remote);
    let d = rec.get("hal-1").unwrap();
    assert_eq!(d.action, Action::MetadataMismatch);
    assert_eq!(d.mismatched, vec![MetadataField::Title]);
}

#[test]
fn executing_then_rerunning_leaves_nothing_to_do() {
    let pubs = vec![publication("hal-a", "Alpha"), publication("hal-b", "Beta")];
    let dir = pdf_dir(&["hal-a", "hal-b"]);
    let store = FakeStore::with_docs(vec![stored("r-old", &publication("hal-x", "Old"), "success")]);

    let report = run(&store, dir.path(), &pubs, &live(10));
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.deleted, 1);
    assert!(report.failures.is_empty());

    let local = scan(dir.path(), &pubs);
    let remote = fetch(&store);
    let rec = reconcile(&pubs, &local, &remote);
    assert_eq!(rec.count(Action::Upload), 0);
    assert_eq!(rec.count(Action::Orphan), 0);
    assert_eq!(rec.count(Action::MetadataMismatch), 0);
    assert_eq!(rec.count(Action::Skip), 2);
}

#[test]
fn dry_run_issues_no_mutations() {
    let pubs = vec![publication("hal-a", "Alpha"), publication("hal-b", "Beta")];
    let dir = pdf_dir(&["hal-a", "hal-b"]);
    let store = FakeStore::with_docs(vec![stored("r-old", &publication("hal-x", "Old"), "success")]);

    let report = run(&store, dir.path(), &pubs, &ExecuteOptions::default());
    assert!(!report.live);
    assert_eq!(report.would_upload, 2);
    assert_eq!(report.would_delete, 1);
    assert_eq!(store.mutations(), (0, 0));

    let report = run(&store, dir.path(), &pubs, &live(0));
    assert!(!report.live);
    assert_eq!(store.mutations(), (0, 0));
}

#[test]
fn upload_budget_caps_successful_creates() {
    let ids = ["hal-1", "hal-2", "hal-3", "hal-4", "hal-5"];
    let pubs: Vec<_> = ids.iter().map(|id| publication(id, id)).collect();
    let dir = pdf_dir(&ids);
    let store = FakeStore::default();

    let report = run(&store, dir.path(), &pubs, &live(2));
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.deferred, 3);
    assert_eq!(store.mutations(), (2, 0));
}

#[test]
fn failed_creates_do_not_consume_budget() {
    let ids = ["hal-a", "hal-b", "hal-c", "hal-d"];
    let pubs: Vec<_> = ids.iter().map(|id| publication(id, id)).collect();
    let dir = pdf_dir(&ids);
    let store = FakeStore::default();
    store.state.lock().unwrap().fail_create.insert("hal-a".into());

    let report = run(&store, dir.path(), &pubs, &live(2));
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].0, "hal-a");
    assert_eq!(report.deferred, 1);
    assert_eq!(store.mutations(), (3, 0));
}

#[test]
fn retry_replaces_failed_copy() {
    let pubs = vec![publication("hal-f", "Failed once")];
    let dir = pdf_dir(&["hal-f"]);
    let store = FakeStore::with_docs(vec![stored("r-f", &pubs[0], "failed")]);

    let options = ExecuteOptions {
        target: Target::FailedIngestions,
        ..live(5)
    };
    let report = run(&store, dir.path(), &pubs, &options);
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(store.stored_ids(), vec!["doc-1"]);
}

#[test]
fn target_limits_what_runs() {
    let pubs = vec![publication("hal-a", "Alpha"), publication("hal-m", "Current")];
    let dir = pdf_dir(&["hal-a", "hal-m"]);
    let mut drifted = stored("r-m", &pubs[1], "success");
    drifted["metadata"]["title"] = json!("Previous");
    let store = FakeStore::with_docs(vec![drifted]);

    let options = ExecuteOptions {
        target: Target::Mismatch,
        ..live(5)
    };
    let report = run(&store, dir.path(), &pubs, &options);
    assert_eq!(report.considered, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.uploaded, 0);
}

#[test]
fn update_mode_patches_drifted_fields_in_place() {
    let pubs = vec![publication("hal-m", "Current title")];
    let dir = pdf_dir(&["hal-m"]);
    let mut drifted = stored("r-m", &pubs[0], "success");
    drifted["metadata"]["title"] = json!("Previous title");
    drifted["metadata"].as_object_mut().unwrap().remove("authors");
    let store = FakeStore::with_docs(vec![drifted]);

    let update = ExecuteOptions {
        on_mismatch: MismatchMode::Update,
        ..live(5)
    };
    let dry = ExecuteOptions {
        execute: false,
        ..update.clone()
    };
    let report = run(&store, dir.path(), &pubs, &dry);
    assert_eq!(report.would_update, 1);
    assert_eq!(store.state.lock().unwrap().patches, 0);

    let report = run(&store, dir.path(), &pubs, &update);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 0);
    assert_eq!(store.mutations(), (0, 0));
    assert_eq!(store.stored_ids(), vec!["r-m"]);

    let local = scan(dir.path(), &pubs);
    let remote = fetch(&store);
    let rec = reconcile(&pubs, &local, &remote);
    assert_eq!(rec.get("hal-m").unwrap().action, Action::Skip);
}

#[test]
fn partial_listing_holds_uploads() {
    let ids = ["hal-0", "hal-1", "hal-2"];
    let pubs: Vec<_> = ids.iter().map(|id| publication(id, "T")).collect();
    let dir = pdf_dir(&ids);
    let docs: Vec<_> = pubs
        .iter()
        .enumerate()
        .map(|(i, p)| stored(&format!("r{i}"), p, "success"))
        .collect();
    let store = FakeStore::with_docs(docs);
    store.state.lock().unwrap().fail_list_from = Some(2);

    let local = scan(dir.path(), &pubs);
    let options = FetchOptions {
        page_size: 2,
        ..Default::default()
    };
    let remote = fetch_inventory(&store, options, &ProgressBar::hidden()).unwrap();
    assert!(!remote.complete);
    let rec = reconcile(&pubs, &local, &remote);
    assert_eq!(rec.get("hal-2").unwrap().action, Action::Upload);

    let options = ExecuteOptions {
        hold_uploads: !remote.complete,
        ..live(5)
    };
    let report = execute(&store, &rec.decisions, &options, &AtomicBool::new(false), &ProgressBar::hidden());
    assert_eq!(report.held, 1);
    assert_eq!(report.uploaded, 0);
    assert_eq!(store.mutations(), (0, 0));
    assert_eq!(store.stored_ids(), vec!["r0", "r1", "r2"]);
}

#[test]
fn stop_flag_halts_before_first_item() {
    let pubs = vec![publication("hal-a", "Alpha")];
    let dir = pdf_dir(&["hal-a"]);
    let store = FakeStore::default();
    let local = scan(dir.path(), &pubs);
    let remote = fetch(&store);
    let rec = reconcile(&pubs, &local, &remote);

    let report = execute(&store, &rec.decisions, &live(5), &AtomicBool::new(true), &ProgressBar::hidden());
    assert!(report.interrupted);
    assert_eq!(store.mutations(), (0, 0));
}

fn numbered(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| stored(&format!("r{i}"), &publication(&format!("hal-{i}"), "T"), "success"))
        .collect()
}

#[test]
fn pagination_stops_on_empty_page() {
    let store = FakeStore::with_docs(numbered(4));
    let options = FetchOptions {
        page_size: 2,
        ..Default::default()
    };
    let inv = fetch_inventory(&store, options, &ProgressBar::hidden()).unwrap();
    assert_eq!(inv.len(), 4);
    assert!(inv.complete);
    assert_eq!(store.state.lock().unwrap().lists, 3);
}

#[test]
fn pagination_stops_on_short_page() {
    let store = FakeStore::with_docs(numbered(5));
    let options = FetchOptions {
        page_size: 2,
        ..Default::default()
    };
    let inv = fetch_inventory(&store, options, &ProgressBar::hidden()).unwrap();
    assert_eq!(inv.len(), 5);
    assert_eq!(store.state.lock().unwrap().lists, 3);
}

#[test]
fn later_page_error_keeps_earlier_pages() {
    let store = FakeStore::with_docs(numbered(5));
    store.state.lock().unwrap().fail_list_from = Some(2);
    let options = FetchOptions {
        page_size: 2,
        ..Default::default()
    };
    let inv = fetch_inventory(&store, options, &ProgressBar::hidden()).unwrap();
    assert_eq!(inv.len(), 2);
    assert!(!inv.complete);
}

#[test]
fn first_page_error_is_fatal() {
    let store = FakeStore::with_docs(numbered(3));
    store.state.lock().unwrap().fail_list_from = Some(0);
    assert!(fetch_inventory(&store, FetchOptions::default(), &ProgressBar::hidden()).is_err());
}

#[test]
fn unreadable_metadata_drops_only_that_record() {
    let mut docs = numbered(2);
    docs.push(json!({"id": "broken", "title": "x", "metadata": "{not json"}));
    docs.push(json!({"id": "listy", "title": "y", "metadata": [1, 2]}));
    let store = FakeStore::with_docs(docs);

    let inv = fetch(&store);
    assert_eq!(inv.len(), 2);
    assert_eq!(inv.dropped, 2);
    assert!(inv.get("hal-0").is_some());
}

#[test]
fn retrieve_returns_single_record() {
    let store = FakeStore::with_docs(numbered(2));
    let record = store.retrieve("r1").unwrap();
    assert_eq!(record["metadata"]["hal_id"], "hal-1");
    assert!(store.retrieve("nope").is_err());
}
