//! Text and date normalization applied to catalog records.

use std::borrow::Cow;

use chrono::NaiveDate;
use quick_xml::escape::{resolve_html5_entity, unescape_with};

use crate::publication::Publication;

/// Longest entity reference we try to decode (`&CounterClockwiseContourIntegral;`).
const MAX_ENTITY_LEN: usize = 34;

/// Lowercase, strip punctuation, collapse whitespace.
///
/// Word characters (letters, digits, underscore, any script) and whitespace
/// survive; everything else is removed before whitespace is collapsed.
pub fn normalize_title(title: &str) -> String {
    let stripped: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// DOI comparison key: trimmed and case-folded, `None` when empty.
pub fn doi_key(doi: &str) -> Option<String> {
    let doi = doi.trim();
    (!doi.is_empty()).then(|| doi.to_lowercase())
}

/// Calendar day of a timestamp such as `2021-06-01T00:00:00Z`.
///
/// Anything that does not start with a `YYYY-MM-DD` day yields `None`.
pub fn truncate_to_day(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().split('T').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Decode HTML entities (`&amp;`, `&eacute;`, `&#233;`).
///
/// Malformed references (a bare `&`, unknown names) are kept literally while
/// the well-formed ones around them are still decoded.
pub fn unescape_html(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    match unescape_with(raw, resolve_html5_entity) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Owned(unescape_lenient(raw)),
    }
}

fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= MAX_ENTITY_LEN)
            .and_then(|end| {
                unescape_with(&tail[..=end], resolve_html5_entity)
                    .ok()
                    .map(|s| (s.into_owned(), end))
            });
        match decoded {
            Some((text, end)) => {
                out.push_str(&text);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode entities in the human-readable text fields of a record.
pub fn normalize_publication(publication: &mut Publication) {
    fn decode_in_place(s: &mut String) {
        if let Cow::Owned(decoded) = unescape_html(s) {
            *s = decoded;
        }
    }
    decode_in_place(&mut publication.citation);
    publication.titles.iter_mut().for_each(decode_in_place);
    publication.abstracts.iter_mut().for_each(decode_in_place);
}
