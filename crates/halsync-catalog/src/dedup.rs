//! Catalog deduplication.
//!
//! Two passes, in this order:
//! 1. Title groups: when a normalized title is shared by at least one working
//!    paper and at least one published version, the working papers go.
//! 2. DOI groups (on the survivors): one record per DOI, chosen by type
//!    priority then highest `docid`. Groups made only of a book and its
//!    chapters keep every member.
//!
//! Input order is preserved among the survivors.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::publication::{DocType, Publication};

/// Counters reported by the preparation and deduplication passes.
///
/// `final_count = total_retrieved - conference_excluded - blacklisted_excluded
///   - no_open_access_excluded - working_papers_excluded - doi_duplicates_excluded`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterStats {
    pub total_retrieved: usize,
    /// Records of a homonymous conference rather than the lab
    #[serde(alias = "cired_conference_excluded")]
    pub conference_excluded: usize,
    pub blacklisted_excluded: usize,
    pub no_open_access_excluded: usize,
    pub working_papers_excluded: usize,
    #[serde(alias = "duplicates_excluded")]
    pub doi_duplicates_excluded: usize,
    /// Members of DOI groups kept whole because they pair a book with its
    /// chapters (already part of `final_count`)
    pub book_chapter_exempted: usize,
    pub final_count: usize,
}

impl FilterStats {
    /// Whether the exclusion counters add up to the final count.
    pub fn is_consistent(&self) -> bool {
        self.total_retrieved
            .checked_sub(self.conference_excluded)
            .and_then(|n| n.checked_sub(self.blacklisted_excluded))
            .and_then(|n| n.checked_sub(self.no_open_access_excluded))
            .and_then(|n| n.checked_sub(self.working_papers_excluded))
            .and_then(|n| n.checked_sub(self.doi_duplicates_excluded))
            == Some(self.final_count)
    }
}

/// Survivors of deduplication and what was dropped on the way.
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    pub publications: Vec<Publication>,
    pub stats: FilterStats,
}

/// Run both passes over `publications`.
///
/// Only `total_retrieved`, `working_papers_excluded`,
/// `doi_duplicates_excluded`, `book_chapter_exempted` and `final_count` are
/// filled in; the caller accounts for filtering done before.
pub fn deduplicate(publications: Vec<Publication>) -> Deduplicated {
    let total_retrieved = publications.len();

    let (publications, working_papers_excluded) = drop_superseded_working_papers(publications);
    let (publications, doi_duplicates_excluded, book_chapter_exempted) =
        collapse_doi_groups(publications);

    log::debug!(
        "dedup: {total_retrieved} in, {working_papers_excluded} working papers, \
         {doi_duplicates_excluded} DOI duplicates, {book_chapter_exempted} kept as book/chapter"
    );

    Deduplicated {
        stats: FilterStats {
            total_retrieved,
            working_papers_excluded,
            doi_duplicates_excluded,
            book_chapter_exempted,
            final_count: publications.len(),
            ..Default::default()
        },
        publications,
    }
}

/// Keep only the positions flagged in `keep`, in order.
fn retain_flagged(publications: Vec<Publication>, keep: &[bool]) -> Vec<Publication> {
    publications
        .into_iter()
        .zip(keep)
        .filter_map(|(p, &k)| k.then_some(p))
        .collect()
}

fn drop_superseded_working_papers(publications: Vec<Publication>) -> (Vec<Publication>, usize) {
    let mut groups: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for (i, p) in publications.iter().enumerate() {
        let key = p.normalized_title();
        // An empty normalized title says nothing about identity
        if !key.is_empty() {
            groups.entry(key).or_default().push(i);
        }
    }

    let mut keep = vec![true; publications.len()];
    let mut excluded = 0;
    for members in groups.values().filter(|m| m.len() > 1) {
        let has_published = members
            .iter()
            .any(|&i| !publications[i].doc_type.is_working_paper());
        if !has_published {
            continue;
        }
        for &i in members {
            if publications[i].doc_type.is_working_paper() {
                log::debug!(
                    "dropping working paper {} ({}), published version exists",
                    publications[i].label(),
                    publications[i].doc_type
                );
                keep[i] = false;
                excluded += 1;
            }
        }
    }

    (retain_flagged(publications, &keep), excluded)
}

/// A book together with its chapters, and nothing else.
fn is_book_with_chapters(types: &BTreeSet<&DocType>) -> bool {
    types.len() == 2 && types.contains(&DocType::Book) && types.contains(&DocType::BookChapter)
}

/// `candidate` beats `incumbent`: lower type priority, then higher docid.
fn outranks(candidate: &Publication, incumbent: &Publication) -> bool {
    let (cp, ip) = (candidate.doc_type.doi_priority(), incumbent.doc_type.doi_priority());
    cp < ip || (cp == ip && candidate.docid > incumbent.docid)
}

fn collapse_doi_groups(publications: Vec<Publication>) -> (Vec<Publication>, usize, usize) {
    let mut groups: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for (i, p) in publications.iter().enumerate() {
        if let Some(key) = p.doi_key() {
            groups.entry(key).or_default().push(i);
        }
    }

    let mut keep = vec![true; publications.len()];
    let mut excluded = 0;
    let mut exempted = 0;
    for (doi, members) in groups.iter().filter(|(_, m)| m.len() > 1) {
        let types: BTreeSet<&DocType> = members.iter().map(|&i| &publications[i].doc_type).collect();
        if is_book_with_chapters(&types) {
            exempted += members.len();
            continue;
        }

        let mut best = members[0];
        for &i in &members[1..] {
            if outranks(&publications[i], &publications[best]) {
                best = i;
            }
        }
        for &i in members.iter().filter(|&&i| i != best) {
            log::debug!(
                "DOI {doi}: dropping {} ({}), keeping {} ({})",
                publications[i].label(),
                publications[i].doc_type,
                publications[best].label(),
                publications[best].doc_type
            );
            keep[i] = false;
            excluded += 1;
        }
    }

    (retain_flagged(publications, &keep), excluded, exempted)
}
