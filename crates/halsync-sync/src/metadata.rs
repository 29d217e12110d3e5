//! Document metadata: catalog-side formatting, remote-side flattening, and
//! the field-by-field comparison between the two.

use std::collections::BTreeMap;
use std::fmt;

use halsync_catalog::Publication;
use serde_json::Value;

/// Prefix of flattened remote metadata columns
pub const META_PREFIX: &str = "meta_";

/// Metadata fields derived from a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataField {
    Title,
    Citation,
    Description,
    PublicationDate,
    Doi,
    HalId,
    DocumentType,
    Authors,
    SourceUrl,
}

impl MetadataField {
    pub const ALL: [Self; 9] = [
        Self::Title,
        Self::Citation,
        Self::Description,
        Self::PublicationDate,
        Self::Doi,
        Self::HalId,
        Self::DocumentType,
        Self::Authors,
        Self::SourceUrl,
    ];

    /// Key under which the field is stored remotely.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Citation => "citation",
            Self::Description => "description",
            Self::PublicationDate => "publication_date",
            Self::Doi => "doi",
            Self::HalId => "hal_id",
            Self::DocumentType => "document_type",
            Self::Authors => "authors",
            Self::SourceUrl => "source_url",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Remote metadata blob that could not be turned into flat columns.
#[derive(Debug)]
pub enum MetadataError {
    /// String-encoded metadata that is not valid JSON
    NotJson(String),
    /// Metadata that is neither an object nor null
    NotObject(&'static str),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJson(msg) => write!(f, "metadata is not valid JSON: {msg}"),
            Self::NotObject(kind) => write!(f, "metadata is a JSON {kind}, expected an object"),
        }
    }
}

impl std::error::Error for MetadataError {}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Quote a string the way Python's `repr` does.
fn python_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Author list as a Python list literal: `['Ann Author', 'Bob Writer']`.
///
/// Documents already in the store carry this form, so it is kept for
/// uploads and comparisons alike.
pub fn python_list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| python_repr(s)).collect();
    format!("[{}]", quoted.join(", "))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let strings: Option<Vec<String>> =
                items.iter().map(|v| v.as_str().map(str::to_string)).collect();
            Some(match strings {
                Some(strings) => python_list_literal(&strings),
                None => value.to_string(),
            })
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

fn flatten_into(prefix: &str, map: &serde_json::Map<String, Value>, out: &mut BTreeMap<String, String>) {
    for (key, value) in map {
        let column = format!("{prefix}{key}");
        match value {
            Value::Object(inner) => flatten_into(&format!("{column}."), inner, out),
            other => {
                if let Some(text) = scalar_text(other) {
                    out.insert(column, text);
                }
            }
        }
    }
}

/// Flatten a stored metadata blob into `meta_`-prefixed string columns.
///
/// The blob may be an object or a JSON-encoded string of one. Nested
/// objects become dotted columns (`meta_a.b`); null values are dropped.
pub fn flatten_metadata(raw: &Value) -> Result<BTreeMap<String, String>, MetadataError> {
    let decoded;
    let value = match raw {
        Value::String(s) if s.trim().is_empty() => return Ok(BTreeMap::new()),
        Value::String(s) => {
            decoded = serde_json::from_str::<Value>(s)
                .map_err(|e| MetadataError::NotJson(e.to_string()))?;
            &decoded
        }
        other => other,
    };
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            flatten_into(META_PREFIX, map, &mut out);
            Ok(out)
        }
        other => Err(MetadataError::NotObject(json_kind(other))),
    }
}

/// Metadata attached to a document, known fields typed and the rest kept
/// as an open map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub citation: Option<String>,
    pub description: Option<String>,
    pub publication_date: Option<String>,
    pub doi: Option<String>,
    pub hal_id: Option<String>,
    pub document_type: Option<String>,
    pub authors: Option<String>,
    pub source_url: Option<String>,
    /// Keys outside the known mapping, unprefixed
    pub extra: BTreeMap<String, String>,
}

/// `None` for empty or whitespace-only text.
fn present(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.trim().is_empty()).then_some(value)
}

impl DocumentMetadata {
    /// Metadata a catalog record should carry in the store.
    pub fn from_publication(publication: &Publication) -> Self {
        let doi = present(publication.doi.as_str());
        let hal_id = present(publication.hal_id.as_str());
        let source_url = match (&doi, &hal_id) {
            (Some(doi), _) => Some(format!("https://doi.org/{doi}")),
            (None, Some(hal_id)) => Some(format!("https://hal.science/{hal_id}")),
            (None, None) => None,
        };
        Self {
            title: present(publication.title()),
            citation: present(publication.citation.as_str()),
            description: present(publication.abstract_text()),
            publication_date: publication
                .produced_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            doi,
            hal_id,
            document_type: present(publication.doc_type.as_str()),
            authors: (!publication.authors.is_empty())
                .then(|| python_list_literal(&publication.authors)),
            source_url,
            extra: BTreeMap::new(),
        }
    }

    /// Rebuild from flattened `meta_` columns. Blank values count as absent.
    pub fn from_columns(columns: &BTreeMap<String, String>) -> Self {
        let mut metadata = Self::default();
        for (column, value) in columns {
            let Some(key) = column.strip_prefix(META_PREFIX) else {
                continue;
            };
            match MetadataField::from_key(key) {
                Some(field) => *metadata.slot_mut(field) = present(value.as_str()),
                None => {
                    metadata.extra.insert(key.to_string(), value.clone());
                }
            }
        }
        metadata
    }

    pub fn get(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::Title => self.title.as_deref(),
            MetadataField::Citation => self.citation.as_deref(),
            MetadataField::Description => self.description.as_deref(),
            MetadataField::PublicationDate => self.publication_date.as_deref(),
            MetadataField::Doi => self.doi.as_deref(),
            MetadataField::HalId => self.hal_id.as_deref(),
            MetadataField::DocumentType => self.document_type.as_deref(),
            MetadataField::Authors => self.authors.as_deref(),
            MetadataField::SourceUrl => self.source_url.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: MetadataField) -> &mut Option<String> {
        match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Citation => &mut self.citation,
            MetadataField::Description => &mut self.description,
            MetadataField::PublicationDate => &mut self.publication_date,
            MetadataField::Doi => &mut self.doi,
            MetadataField::HalId => &mut self.hal_id,
            MetadataField::DocumentType => &mut self.document_type,
            MetadataField::Authors => &mut self.authors,
            MetadataField::SourceUrl => &mut self.source_url,
        }
    }

    /// Flat string map sent with an upload. Absent fields are omitted.
    pub fn to_upload_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self.extra.clone();
        for field in MetadataField::ALL {
            if let Some(value) = self.get(field) {
                map.insert(field.key().to_string(), value.to_string());
            }
        }
        map
    }
}

/// Fields whose stored value differs from the expected one, in field order.
/// Empty means aligned.
pub fn diff_metadata(expected: &DocumentMetadata, stored: &DocumentMetadata) -> Vec<MetadataField> {
    MetadataField::ALL
        .into_iter()
        .filter(|&field| {
            let stored_value = stored.get(field).filter(|v| !v.trim().is_empty());
            expected.get(field) != stored_value
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use halsync_catalog::DocType;
    use serde_json::json;

    fn sample() -> Publication {
        Publication {
            docid: 1,
            hal_id: "hal-001234".into(),
            doi: "10.1000/xyz".into(),
            titles: vec!["Carbon pricing".into(), "Tarification".into()],
            citation: "A. Author. Carbon pricing.".into(),
            abstracts: vec!["We study.".into()],
            doc_type: DocType::Article,
            produced_date: NaiveDate::from_ymd_opt(2020, 3, 1),
            authors: vec!["Ann Author".into(), "Bob O'Writer".into()],
            ..Default::default()
        }
    }

    #[test]
    fn formats_catalog_record() {
        let m = DocumentMetadata::from_publication(&sample());
        assert_eq!(m.title.as_deref(), Some("Carbon pricing"));
        assert_eq!(m.publication_date.as_deref(), Some("2020-03-01"));
        assert_eq!(m.document_type.as_deref(), Some("ART"));
        assert_eq!(m.authors.as_deref(), Some(r#"['Ann Author', "Bob O'Writer"]"#));
        assert_eq!(m.source_url.as_deref(), Some("https://doi.org/10.1000/xyz"));
    }

    #[test]
    fn source_url_falls_back_to_hal_id() {
        let mut p = sample();
        p.doi.clear();
        let m = DocumentMetadata::from_publication(&p);
        assert_eq!(m.doi, None);
        assert_eq!(m.source_url.as_deref(), Some("https://hal.science/hal-001234"));
        assert!(!m.to_upload_map().contains_key("doi"));
    }

    #[test]
    fn empty_fields_omitted_from_upload() {
        let p = Publication {
            hal_id: "hal-1".into(),
            ..Default::default()
        };
        let map = DocumentMetadata::from_publication(&p).to_upload_map();
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["hal_id", "source_url"]);
    }

    #[test]
    fn python_literal_quoting() {
        assert_eq!(python_list_literal(&[]), "[]");
        assert_eq!(python_list_literal(&["a\\b".to_string()]), r"['a\\b']");
        assert_eq!(
            python_list_literal(&[r#"it's "x""#.to_string()]),
            r#"['it\'s "x"']"#
        );
    }

    #[test]
    fn flattens_string_encoded_metadata() {
        let cols = flatten_metadata(&json!(r#"{"hal_id": "hal-1", "extra": {"lang": "en"}, "n": 3}"#))
            .unwrap();
        assert_eq!(cols["meta_hal_id"], "hal-1");
        assert_eq!(cols["meta_extra.lang"], "en");
        assert_eq!(cols["meta_n"], "3");
    }

    #[test]
    fn flattens_object_and_string_arrays() {
        let cols = flatten_metadata(&json!({"authors": ["A", "B"], "skip": null})).unwrap();
        assert_eq!(cols["meta_authors"], "['A', 'B']");
        assert!(!cols.contains_key("meta_skip"));
    }

    #[test]
    fn bad_metadata_rejected() {
        assert!(matches!(
            flatten_metadata(&json!("{oops")),
            Err(MetadataError::NotJson(_))
        ));
        assert!(matches!(
            flatten_metadata(&json!([1, 2])),
            Err(MetadataError::NotObject("array"))
        ));
        assert!(flatten_metadata(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn aligned_metadata_has_no_diff() {
        let expected = DocumentMetadata::from_publication(&sample());
        let mut columns = BTreeMap::new();
        for (k, v) in expected.to_upload_map() {
            columns.insert(format!("meta_{k}"), v);
        }
        columns.insert("meta_version".into(), "v0".into());
        let stored = DocumentMetadata::from_columns(&columns);
        assert!(diff_metadata(&expected, &stored).is_empty());
        assert_eq!(stored.extra["version"], "v0");
    }

    #[test]
    fn title_difference_reported() {
        let expected = DocumentMetadata::from_publication(&sample());
        let stored = DocumentMetadata {
            title: Some("Carbon pricing (draft)".into()),
            ..expected.clone()
        };
        assert_eq!(diff_metadata(&expected, &stored), vec![MetadataField::Title]);
    }

    #[test]
    fn blank_remote_value_is_absent() {
        let mut p = sample();
        p.abstracts.clear();
        let expected = DocumentMetadata::from_publication(&p);
        let stored = DocumentMetadata {
            description: Some("   ".into()),
            ..expected.clone()
        };
        assert!(diff_metadata(&expected, &stored).is_empty());

        let missing_remote = DocumentMetadata {
            citation: None,
            ..expected.clone()
        };
        assert_eq!(
            diff_metadata(&expected, &missing_remote),
            vec![MetadataField::Citation]
        );
    }

    #[test]
    fn truncated_author_list_differs() {
        let expected = DocumentMetadata::from_publication(&sample());
        let stored = DocumentMetadata {
            authors: Some("['Ann Author']".into()),
            ..expected.clone()
        };
        assert_eq!(diff_metadata(&expected, &stored), vec![MetadataField::Authors]);
    }
}
