//! Local inventory: which catalog entries have a usable file on disk.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use halsync_catalog::Publication;
use rustc_hash::FxHashMap;

/// Extensions `infer` can recognize from content. For these, a file whose
/// content is not identified is not trusted.
const SNIFFABLE: &[&str] = &["pdf", "epub", "docx", "odt", "png", "jpg", "gif"];

/// Classification of one catalog entry against the local directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalStatus {
    /// File present, expected type, within the size cap
    Available,
    /// File present but larger than the size cap
    Oversized,
    /// Something exists under the id, but not a file of the expected type
    WrongType,
    Missing,
}

/// A file matched to a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    /// File stem, in whichever spelling of the external id matched
    pub stem_key: String,
    pub size: u64,
    /// Detected MIME type, `None` when unidentified
    pub content_type: Option<String>,
}

/// Scan settings.
#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Expected extension, without the dot
    pub extension: String,
    /// Files strictly larger than this are oversized
    pub max_file_size: u64,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            extension: "pdf".to_string(),
            max_file_size: 30_000_000,
        }
    }
}

/// Per-class counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalCounts {
    pub available: usize,
    pub oversized: usize,
    pub wrong_type: usize,
    pub missing: usize,
    /// Entries skipped because they advertise no fulltext
    pub no_fulltext: usize,
}

/// Result of scanning the local directory for a catalog.
#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    /// Available files by external id
    pub available: BTreeMap<String, LocalFile>,
    statuses: FxHashMap<String, LocalStatus>,
    pub counts: LocalCounts,
}

/// Both spellings of an external id: as-is and with `-` replaced by `_`.
pub fn stem_spellings(hal_id: &str) -> Vec<String> {
    let underscored = hal_id.replace('-', "_");
    if underscored == hal_id {
        vec![hal_id.to_string()]
    } else {
        vec![hal_id.to_string(), underscored]
    }
}

fn content_matches(content_type: Option<infer::Type>, extension: &str) -> bool {
    match content_type {
        Some(kind) => kind.extension().eq_ignore_ascii_case(extension),
        None => !SNIFFABLE.iter().any(|e| e.eq_ignore_ascii_case(extension)),
    }
}

/// Any file named `{stem}.*`, whatever its extension.
fn has_other_file(dir: &Path, stem: &str) -> bool {
    let pattern = format!(
        "{}/{}.*",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(stem)
    );
    glob::glob(&pattern)
        .map(|mut paths| paths.any(|p| p.map(|p| p.is_file()).unwrap_or(false)))
        .unwrap_or(false)
}

fn classify(dir: &Path, hal_id: &str, options: &LocalOptions) -> (LocalStatus, Option<LocalFile>) {
    let spellings = stem_spellings(hal_id);
    // A bad file under one spelling does not hide a good one under the other
    let mut rejected = false;
    for stem in &spellings {
        let path = dir.join(format!("{stem}.{}", options.extension));
        let Ok(meta) = path.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let kind = match infer::get_from_path(&path) {
            Ok(kind) => kind,
            Err(e) => {
                log::warn!("{}: cannot read: {e}", path.display());
                rejected = true;
                continue;
            }
        };
        if !content_matches(kind, &options.extension) {
            log::warn!(
                "{}: content is {}, not {}",
                path.display(),
                kind.map_or("unidentified", |k| k.mime_type()),
                options.extension
            );
            rejected = true;
            continue;
        }
        let file = LocalFile {
            path,
            stem_key: stem.clone(),
            size: meta.len(),
            content_type: kind.map(|k| k.mime_type().to_string()),
        };
        if file.size > options.max_file_size {
            log::warn!(
                "{}: {} bytes exceeds the {} byte limit",
                file.path.display(),
                file.size,
                options.max_file_size
            );
            return (LocalStatus::Oversized, Some(file));
        }
        return (LocalStatus::Available, Some(file));
    }

    if rejected {
        return (LocalStatus::WrongType, None);
    }
    if spellings.iter().any(|stem| has_other_file(dir, stem)) {
        log::warn!("{hal_id}: file present without the .{} extension", options.extension);
        return (LocalStatus::WrongType, None);
    }
    (LocalStatus::Missing, None)
}

impl LocalInventory {
    /// Classify every catalog entry with a fulltext URL.
    ///
    /// Fails only when `dir` is not a readable directory.
    pub fn scan(dir: &Path, publications: &[Publication], options: &LocalOptions) -> io::Result<Self> {
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let mut inventory = Self::default();
        for publication in publications {
            if !publication.has_fulltext() {
                inventory.counts.no_fulltext += 1;
                continue;
            }
            let hal_id = publication.hal_id.trim();
            if hal_id.is_empty() || inventory.statuses.contains_key(hal_id) {
                continue;
            }

            let (status, file) = classify(dir, hal_id, options);
            match status {
                LocalStatus::Available => inventory.counts.available += 1,
                LocalStatus::Oversized => inventory.counts.oversized += 1,
                LocalStatus::WrongType => inventory.counts.wrong_type += 1,
                LocalStatus::Missing => {
                    log::debug!("{hal_id}: no local file");
                    inventory.counts.missing += 1;
                }
            }
            if let (LocalStatus::Available, Some(file)) = (status, file) {
                inventory.available.insert(hal_id.to_string(), file);
            }
            inventory.statuses.insert(hal_id.to_string(), status);
        }

        let c = inventory.counts;
        log::info!(
            "Local files: {} available, {} oversized, {} wrong type, {} missing, {} without fulltext",
            c.available,
            c.oversized,
            c.wrong_type,
            c.missing,
            c.no_fulltext
        );
        Ok(inventory)
    }

    pub fn status(&self, hal_id: &str) -> Option<LocalStatus> {
        self.statuses.get(hal_id).copied()
    }

    pub fn file(&self, hal_id: &str) -> Option<&LocalFile> {
        self.available.get(hal_id)
    }
}
