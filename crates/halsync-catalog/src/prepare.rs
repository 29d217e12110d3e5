//! Turn a raw source response into a prepared, deduplicated catalog snapshot.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::dedup::{FilterStats, deduplicate};
use crate::loader::CatalogError;
use crate::publication::Publication;

/// Prepared catalog as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedCatalog {
    pub processing_timestamp: String,
    pub source_file: String,
    pub filtering_statistics: FilterStats,
    pub publications: Vec<Publication>,
    /// Records set aside as homonymous conference communications
    pub excluded_communications: Vec<Publication>,
    #[serde(skip)]
    prepared_at: NaiveDateTime,
}

impl PreparedCatalog {
    /// `catalog_YYYYMMDD_HHMMSS.json`
    pub fn file_name(&self) -> String {
        format!("catalog_{}.json", self.prepared_at.format("%Y%m%d_%H%M%S"))
    }
}

/// Filters applied ahead of deduplication.
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    /// External ids never admitted to the catalog
    pub blacklist: FxHashSet<String>,
    /// Acronym of the lab the catalog is about. A record that cites it
    /// without listing it among its lab structures belongs to a homonymous
    /// conference and is set aside.
    pub lab_acronym: Option<String>,
}

impl PrepareOptions {
    fn is_homonymous_conference(&self, publication: &Publication) -> bool {
        let Some(acronym) = self.lab_acronym.as_deref().filter(|a| !a.is_empty()) else {
            return false;
        };
        !publication.lab_acronyms().contains(&acronym) && publication.citation.contains(acronym)
    }
}

/// Filter and deduplicate `raw`.
///
/// Homonymous conference records go first, then blacklisted ids, then
/// records without a fulltext URL, then the deduplication passes. Survivors
/// are sorted by external id.
pub fn prepare(
    raw: Vec<Publication>,
    options: &PrepareOptions,
    source_file: &str,
    now: NaiveDateTime,
) -> PreparedCatalog {
    let total_retrieved = raw.len();

    let (related, conference): (Vec<_>, Vec<_>) = raw
        .into_iter()
        .partition(|p| !options.is_homonymous_conference(p));
    if !conference.is_empty() {
        log::info!("{} homonymous conference communications set aside", conference.len());
    }

    let (kept, blacklisted): (Vec<_>, Vec<_>) = related
        .into_iter()
        .partition(|p| !options.blacklist.contains(p.hal_id.trim()));
    for p in &blacklisted {
        log::debug!("blacklisted: {}", p.label());
    }

    let (open_access, closed): (Vec<_>, Vec<_>) = kept.into_iter().partition(Publication::has_fulltext);
    if !closed.is_empty() {
        log::info!("{} publications without fulltext excluded", closed.len());
    }

    let deduped = deduplicate(open_access);
    let mut publications = deduped.publications;
    publications.sort_by(|a, b| a.hal_id.cmp(&b.hal_id));

    let filtering_statistics = FilterStats {
        total_retrieved,
        conference_excluded: conference.len(),
        blacklisted_excluded: blacklisted.len(),
        no_open_access_excluded: closed.len(),
        final_count: publications.len(),
        ..deduped.stats
    };

    PreparedCatalog {
        processing_timestamp: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        source_file: source_file.to_string(),
        filtering_statistics,
        publications,
        excluded_communications: conference,
        prepared_at: now,
    }
}

/// Write `catalog` into `dir` under its timestamped name. Returns the path.
///
/// Written to a `.tmp` sibling first, then renamed into place.
pub fn write_prepared(dir: &Path, catalog: &PreparedCatalog) -> Result<PathBuf, CatalogError> {
    std::fs::create_dir_all(dir).map_err(|e| CatalogError::io(dir, e))?;
    let final_path = dir.join(catalog.file_name());
    let tmp_path = final_path.with_extension("json.tmp");

    let json = serde_json::to_vec_pretty(catalog).map_err(|e| CatalogError::Parse {
        path: final_path.clone(),
        message: e.to_string(),
    })?;
    std::fs::write(&tmp_path, json).map_err(|e| CatalogError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, &final_path).map_err(|e| CatalogError::io(&final_path, e))?;

    log::info!(
        "Wrote {} publications to {}",
        catalog.publications.len(),
        final_path.display()
    );
    Ok(final_path)
}
