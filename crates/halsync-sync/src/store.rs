//! Remote document store interface.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

/// Errors from store calls. Transient ones (429, 5xx, network) are retryable.
pub type StoreError = halsync_core::HttpError;

/// One page of a document listing. Records stay raw so a malformed one can
/// be dropped without losing the page.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    pub results: Vec<Value>,
    /// Total document count, when the store reports it
    pub total_entries: Option<u64>,
}

/// Operations the sync pipeline needs from a document store.
pub trait DocumentStore {
    /// List documents starting at `offset`.
    fn list(&self, limit: usize, offset: usize) -> Result<DocumentPage, StoreError>;

    /// Fetch a single document record.
    fn retrieve(&self, id: &str) -> Result<Value, StoreError>;

    /// Upload a file with flat string metadata. Returns the new document id.
    fn create(
        &self,
        file: &Path,
        metadata: &BTreeMap<String, String>,
        collection: Option<&str>,
    ) -> Result<String, StoreError>;

    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Merge `metadata` into a stored document's metadata, overwriting the
    /// given keys and leaving the others alone.
    fn append_metadata(&self, id: &str, metadata: &BTreeMap<String, String>) -> Result<(), StoreError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn list(&self, limit: usize, offset: usize) -> Result<DocumentPage, StoreError> {
        (**self).list(limit, offset)
    }

    fn retrieve(&self, id: &str) -> Result<Value, StoreError> {
        (**self).retrieve(id)
    }

    fn create(
        &self,
        file: &Path,
        metadata: &BTreeMap<String, String>,
        collection: Option<&str>,
    ) -> Result<String, StoreError> {
        (**self).create(file, metadata, collection)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        (**self).delete(id)
    }

    fn append_metadata(&self, id: &str, metadata: &BTreeMap<String, String>) -> Result<(), StoreError> {
        (**self).append_metadata(id, metadata)
    }
}

/// Reachability check: list a single document.
pub fn check_connection(store: &dyn DocumentStore) -> Result<(), StoreError> {
    store.list(1, 0).map(|_| ())
}
