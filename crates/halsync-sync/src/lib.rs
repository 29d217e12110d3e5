//! Halsync sync - reconcile a catalog with a remote document store
//!
//! Pipeline: scan local files ([`LocalInventory`]), page through the store
//! ([`fetch_inventory`]), decide per entry ([`reconcile`]), then apply the
//! selected decisions ([`execute`]). Nothing is mutated unless execution is
//! requested with a positive upload budget.

pub mod executor;
pub mod inspect;
pub mod local;
pub mod metadata;
pub mod r2r;
pub mod reconcile;
pub mod remote;
pub mod store;
pub mod summary;

// Re-exports
pub use executor::{ExecuteOptions, ExecutionReport, MismatchMode, execute};
pub use local::{LocalCounts, LocalFile, LocalInventory, LocalOptions, LocalStatus};
pub use metadata::{DocumentMetadata, MetadataError, MetadataField, diff_metadata, flatten_metadata};
pub use r2r::R2rClient;
pub use reconcile::{Action, Decision, MatchedBy, Reconciliation, Target, reconcile};
pub use remote::{FetchOptions, IngestionStatus, RemoteDocument, RemoteInventory, fetch_inventory};
pub use store::{DocumentPage, DocumentStore, StoreError, check_connection};
pub use summary::SyncSummary;
