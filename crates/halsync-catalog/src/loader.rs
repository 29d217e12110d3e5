//! Catalog snapshot discovery and parsing.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::Value;

use crate::dedup::FilterStats;
use crate::normalize::normalize_publication;
use crate::publication::Publication;

/// Prepared catalog snapshots written by `prepare`
pub const CATALOG_PATTERN: &str = "catalog_*.json";
/// Raw source responses saved by the query step
pub const RAW_RESPONSE_PATTERN: &str = "hal_response_*.json";

/// Errors while locating or reading a catalog.
#[derive(Debug)]
pub enum CatalogError {
    /// No snapshot could be found at the given location
    NotFound(PathBuf),
    Io { path: PathBuf, source: io::Error },
    /// File is not valid JSON, or a record is not an object
    Parse { path: PathBuf, message: String },
    /// Valid JSON in a layout we do not recognize
    Shape { path: PathBuf, message: String },
    /// Catalog parsed but holds no publications
    Empty(PathBuf),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(p) => write!(f, "no catalog found at {}", p.display()),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Parse { path, message } => {
                write!(f, "{}: invalid catalog JSON: {message}", path.display())
            }
            Self::Shape { path, message } => {
                write!(f, "{}: unrecognized catalog layout: {message}", path.display())
            }
            Self::Empty(p) => write!(f, "{}: catalog contains no publications", p.display()),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl CatalogError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Parsed catalog with provenance.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub publications: Vec<Publication>,
    /// File the catalog was read from
    pub path: PathBuf,
    pub processing_timestamp: Option<String>,
    /// Raw response the snapshot was prepared from
    pub source_file: Option<String>,
    pub statistics: Option<FilterStats>,
}

#[derive(Deserialize)]
struct PreparedFile {
    publications: Vec<Value>,
    #[serde(default)]
    processing_timestamp: Option<String>,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    filtering_statistics: Option<FilterStats>,
}

/// Most recently modified file in `dir` matching `pattern`.
pub fn latest_matching(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let full = format!("{}/{pattern}", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths = match glob::glob(&full) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("bad glob {full}: {e}");
            return None;
        }
    };
    paths
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| {
            let mtime = p
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (mtime, p)
        })
        .max_by(|(a, pa), (b, pb)| a.cmp(b).then_with(|| pa.cmp(pb)))
        .map(|(_, p)| p)
}

/// Pick the catalog to use: explicit path, else latest prepared snapshot,
/// else the legacy fixed-path file.
pub fn resolve_catalog_path(
    explicit: Option<&Path>,
    prepared_dir: &Path,
    legacy: Option<&Path>,
) -> Result<PathBuf, CatalogError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(CatalogError::NotFound(path.to_path_buf()))
        };
    }
    if let Some(latest) = latest_matching(prepared_dir, CATALOG_PATTERN) {
        return Ok(latest);
    }
    match legacy {
        Some(path) if path.is_file() => {
            log::info!("No prepared catalog in {}, using {}", prepared_dir.display(), path.display());
            Ok(path.to_path_buf())
        }
        _ => Err(CatalogError::NotFound(prepared_dir.to_path_buf())),
    }
}

fn parse_records(path: &Path, records: Vec<Value>) -> Result<Vec<Publication>, CatalogError> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let mut publication: Publication =
                serde_json::from_value(record).map_err(|e| CatalogError::Parse {
                    path: path.to_path_buf(),
                    message: format!("record {i}: {e}"),
                })?;
            normalize_publication(&mut publication);
            Ok(publication)
        })
        .collect()
}

/// Read any supported snapshot layout:
/// a bare array, a prepared catalog object, or a raw `{"response": {"docs": [...]}}`.
pub fn read_snapshot(path: &Path) -> Result<Catalog, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| CatalogError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut catalog = Catalog {
        path: path.to_path_buf(),
        ..Default::default()
    };
    match value {
        Value::Array(records) => {
            catalog.publications = parse_records(path, records)?;
        }
        Value::Object(map) if map.contains_key("publications") => {
            let file: PreparedFile =
                serde_json::from_value(Value::Object(map)).map_err(|e| CatalogError::Shape {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            catalog.publications = parse_records(path, file.publications)?;
            catalog.processing_timestamp = file.processing_timestamp;
            catalog.source_file = file.source_file;
            catalog.statistics = file.filtering_statistics;
        }
        Value::Object(mut map) => {
            let docs = map
                .get_mut("response")
                .and_then(|r| r.get_mut("docs"))
                .map(Value::take);
            match docs {
                Some(Value::Array(records)) => {
                    catalog.publications = parse_records(path, records)?;
                }
                _ => {
                    return Err(CatalogError::Shape {
                        path: path.to_path_buf(),
                        message: "expected an array, a `publications` list or `response.docs`"
                            .into(),
                    });
                }
            }
        }
        _ => {
            return Err(CatalogError::Shape {
                path: path.to_path_buf(),
                message: "top-level value is not an array or object".into(),
            });
        }
    }
    Ok(catalog)
}

/// Load the catalog used for synchronization. An empty catalog is an error.
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let catalog = read_snapshot(path)?;
    if catalog.publications.is_empty() {
        return Err(CatalogError::Empty(path.to_path_buf()));
    }
    log::info!(
        "Loaded {} publications from {}",
        catalog.publications.len(),
        path.display()
    );
    if let Some(stats) = &catalog.statistics {
        if !stats.is_consistent() {
            log::warn!("{}: filtering statistics do not add up", path.display());
        }
    }
    Ok(catalog)
}

/// External ids excluded from preparation.
///
/// Accepts `{"excluded_hal_ids": [...]}` or a bare array. A missing file
/// means an empty blacklist.
pub fn load_blacklist(path: &Path) -> Result<FxHashSet<String>, CatalogError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("no blacklist at {}", path.display());
            return Ok(FxHashSet::default());
        }
        Err(e) => return Err(CatalogError::io(path, e)),
    };
    let value: Value = serde_json::from_str(&text).map_err(|e| CatalogError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let ids = match value {
        Value::Array(ids) => ids,
        Value::Object(mut map) => match map.remove("excluded_hal_ids") {
            Some(Value::Array(ids)) => ids,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(ids
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect())
}
