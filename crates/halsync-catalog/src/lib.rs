//! Halsync catalog - bibliographic catalog loading and deduplication
//!
//! Reads catalog snapshots (raw source responses or prepared catalogs),
//! normalizes their text and dates, and reduces them to one record per work.
//!
//! # Example
//!
//! ```ignore
//! use halsync_catalog::{load_catalog, resolve_catalog_path};
//!
//! let path = resolve_catalog_path(None, "data/prepared".as_ref(), None)?;
//! let catalog = load_catalog(&path)?;
//! println!("{} publications", catalog.publications.len());
//! ```

pub mod dedup;
pub mod loader;
pub mod normalize;
pub mod prepare;
pub mod publication;

// Re-exports
pub use dedup::{Deduplicated, FilterStats, deduplicate};
pub use loader::{
    CATALOG_PATTERN, Catalog, CatalogError, RAW_RESPONSE_PATTERN, latest_matching, load_blacklist,
    load_catalog, read_snapshot, resolve_catalog_path,
};
pub use normalize::{normalize_title, unescape_html};
pub use prepare::{PrepareOptions, PreparedCatalog, prepare, write_prepared};
pub use publication::{DocType, Publication};
