//! Three-way reconciliation of catalog, local files and remote store.
//!
//! Remote documents are joined to catalog entries by the external id stored
//! in their metadata. Documents without that id get a second, best-effort
//! pass by title; such matches are flagged for review and never acted on.

use std::fmt;
use std::str::FromStr;

use halsync_catalog::{Publication, normalize_title};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::local::{LocalFile, LocalInventory, stem_spellings};
use crate::metadata::{DocumentMetadata, MetadataField, diff_metadata};
use crate::remote::{RemoteDocument, RemoteInventory};

/// What should happen to one catalog entry or remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// File available locally, nothing in the store
    Upload,
    /// Already in the store and aligned, in progress, or needs review
    Skip,
    /// Stored copy failed ingestion; replace it
    RetryFailed,
    /// Stored document with no catalog entry
    Orphan,
    /// Stored metadata disagrees with the catalog
    MetadataMismatch,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Skip => "skip",
            Self::RetryFailed => "retry-failed",
            Self::Orphan => "orphan",
            Self::MetadataMismatch => "metadata-mismatch",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which decisions are carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    /// Uploads and orphan deletions
    Missing,
    /// Metadata mismatch deletions
    Mismatch,
    /// Failed ingestion replacements
    FailedIngestions,
    #[default]
    All,
}

impl Target {
    pub fn selects(&self, action: Action) -> bool {
        match (self, action) {
            (_, Action::Skip) => false,
            (Self::All, _) => true,
            (Self::Missing, Action::Upload | Action::Orphan) => true,
            (Self::Mismatch, Action::MetadataMismatch) => true,
            (Self::FailedIngestions, Action::RetryFailed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Mismatch => "mismatch",
            Self::FailedIngestions => "failed-ingestions",
            Self::All => "all",
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(Self::Missing),
            "mismatch" => Ok(Self::Mismatch),
            "failed-ingestions" => Ok(Self::FailedIngestions),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown target '{other}' (expected missing, mismatch, failed-ingestions or all)"
            )),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a remote document was tied to a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    ExternalId,
    Title,
}

/// One reconciliation outcome.
#[derive(Debug, Clone)]
pub struct Decision<'a> {
    pub action: Action,
    /// Catalog external id, or the id stored on an orphan
    pub hal_id: Option<String>,
    pub publication: Option<&'a Publication>,
    pub local: Option<&'a LocalFile>,
    pub remote: Option<&'a RemoteDocument>,
    pub matched_by: Option<MatchedBy>,
    /// Fields that differ, for `MetadataMismatch`
    pub mismatched: Vec<MetadataField>,
    /// Matched by title only
    pub needs_review: bool,
    /// Metadata the catalog entry should carry
    pub expected: Option<DocumentMetadata>,
}

impl Decision<'_> {
    /// Short label for logs.
    pub fn label(&self) -> String {
        match (&self.hal_id, self.remote) {
            (Some(hal_id), Some(doc)) => format!("{hal_id} [{}]", doc.id),
            (Some(hal_id), None) => hal_id.clone(),
            (None, Some(doc)) => doc.label(),
            (None, None) => "<unknown>".to_string(),
        }
    }
}

/// All decisions of one run, in catalog order followed by orphans.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation<'a> {
    pub decisions: Vec<Decision<'a>>,
}

impl<'a> Reconciliation<'a> {
    pub fn count(&self, action: Action) -> usize {
        self.decisions.iter().filter(|d| d.action == action).count()
    }

    pub fn needing_review(&self) -> impl Iterator<Item = &Decision<'a>> {
        self.decisions.iter().filter(|d| d.needs_review)
    }

    /// Decisions `target` would carry out.
    pub fn selected(&self, target: Target) -> impl Iterator<Item = &Decision<'a>> {
        self.decisions.iter().filter(move |d| target.selects(d.action))
    }

    pub fn get(&self, hal_id: &str) -> Option<&Decision<'a>> {
        self.decisions.iter().find(|d| d.hal_id.as_deref() == Some(hal_id))
    }
}

/// Remote documents without a stored external id, keyed for title lookup.
struct TitleIndex {
    by_key: FxHashMap<String, Vec<usize>>,
}

impl TitleIndex {
    fn build(remote: &RemoteInventory) -> Self {
        let mut by_key: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (i, doc) in remote.documents.iter().enumerate() {
            if doc.hal_id().is_some() {
                continue;
            }
            let stem = doc.title_stem();
            if stem.is_empty() {
                continue;
            }
            by_key.entry(stem.to_string()).or_default().push(i);
            let normalized = normalize_title(stem);
            if !normalized.is_empty() && normalized != stem {
                by_key.entry(normalized).or_default().push(i);
            }
        }
        Self { by_key }
    }

    /// First unclaimed document titled after the file stem or the title.
    fn find(&self, publication: &Publication, claimed: &[bool]) -> Option<usize> {
        let mut keys = stem_spellings(publication.hal_id.trim());
        let normalized = publication.normalized_title();
        if !normalized.is_empty() {
            keys.push(normalized);
        }
        keys.iter()
            .filter_map(|k| self.by_key.get(k))
            .flatten()
            .copied()
            .find(|&i| !claimed[i])
    }
}

/// Decide an action for every catalog entry and every unclaimed remote document.
pub fn reconcile<'a>(
    publications: &'a [Publication],
    local: &'a LocalInventory,
    remote: &'a RemoteInventory,
) -> Reconciliation<'a> {
    let catalog_ids: FxHashSet<&str> = publications
        .iter()
        .map(|p| p.hal_id.trim())
        .filter(|id| !id.is_empty())
        .collect();

    // Everything carrying a catalog id is accounted for, including extra
    // copies that lost the index election.
    let mut claimed: Vec<bool> = remote
        .documents
        .iter()
        .map(|d| d.hal_id().is_some_and(|id| catalog_ids.contains(id)))
        .collect();
    let titles = TitleIndex::build(remote);

    let mut decisions = Vec::new();
    let mut seen: FxHashSet<&str> = FxHashSet::default();

    for publication in publications {
        let hal_id = publication.hal_id.trim();
        if hal_id.is_empty() || !seen.insert(hal_id) {
            continue;
        }
        let file = local.file(hal_id);
        let expected = DocumentMetadata::from_publication(publication);

        let matched = match remote.position(hal_id) {
            Some(i) => Some((i, MatchedBy::ExternalId)),
            None => titles
                .find(publication, &claimed)
                .map(|i| (i, MatchedBy::Title)),
        };

        let mut decision = Decision {
            action: Action::Skip,
            hal_id: Some(hal_id.to_string()),
            publication: Some(publication),
            local: file,
            remote: None,
            matched_by: None,
            mismatched: Vec::new(),
            needs_review: false,
            expected: None,
        };

        match matched {
            None => {
                if file.is_none() {
                    // Nothing to send and nothing stored
                    continue;
                }
                decision.action = Action::Upload;
            }
            Some((i, MatchedBy::Title)) => {
                claimed[i] = true;
                let doc = &remote.documents[i];
                log::warn!(
                    "{hal_id}: matched remote document {} by title only, review needed",
                    doc.id
                );
                decision.remote = Some(doc);
                decision.matched_by = Some(MatchedBy::Title);
                decision.needs_review = true;
            }
            Some((i, MatchedBy::ExternalId)) => {
                let doc = &remote.documents[i];
                decision.remote = Some(doc);
                decision.matched_by = Some(MatchedBy::ExternalId);
                if doc.ingestion_status.is_failed() {
                    if file.is_some() {
                        decision.action = Action::RetryFailed;
                    } else {
                        log::warn!("{hal_id}: ingestion failed and no local file to retry with");
                    }
                } else if doc.ingestion_status.is_success() {
                    let diff = diff_metadata(&expected, &doc.metadata);
                    if !diff.is_empty() {
                        log::debug!(
                            "{hal_id}: metadata differs on {}",
                            diff.iter().map(MetadataField::key).collect::<Vec<_>>().join(", ")
                        );
                        decision.action = Action::MetadataMismatch;
                        decision.mismatched = diff;
                    }
                } else {
                    log::debug!("{hal_id}: ingestion {}, leaving as is", doc.ingestion_status);
                }
            }
        }
        decision.expected = Some(expected);
        decisions.push(decision);
    }

    for (i, doc) in remote.documents.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        decisions.push(Decision {
            action: Action::Orphan,
            hal_id: doc.hal_id().map(str::to_string),
            publication: None,
            local: None,
            remote: Some(doc),
            matched_by: None,
            mismatched: Vec::new(),
            needs_review: false,
            expected: None,
        });
    }

    let reconciliation = Reconciliation { decisions };
    log::info!(
        "Decisions: {} upload, {} skip, {} retry, {} orphan, {} mismatch, {} to review",
        reconciliation.count(Action::Upload),
        reconciliation.count(Action::Skip),
        reconciliation.count(Action::RetryFailed),
        reconciliation.count(Action::Orphan),
        reconciliation.count(Action::MetadataMismatch),
        reconciliation.needing_review().count()
    );
    reconciliation
}
