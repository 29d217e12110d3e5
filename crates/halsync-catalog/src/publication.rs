//! Publication record as exported by the bibliographic source.
//!
//! Field names follow the source's JSON (`halId_s`, `title_s`, ...). Fields
//! the pipeline does not interpret are kept in `extra` so a prepared catalog
//! round-trips everything it was given.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::normalize::{doi_key, normalize_title, truncate_to_day};

/// Document type code of a publication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    /// `ART`: journal article
    Article,
    /// `COMM`: conference communication
    Communication,
    /// `OUV`: book
    Book,
    /// `COUV`: book chapter
    BookChapter,
    /// `UNDEFINED`: preprint / working paper
    Undefined,
    /// `OTHER`
    Other,
    /// `REPORT`
    Report,
    /// Any other code, kept verbatim
    Unlisted(String),
}

impl DocType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Article => "ART",
            Self::Communication => "COMM",
            Self::Book => "OUV",
            Self::BookChapter => "COUV",
            Self::Undefined => "UNDEFINED",
            Self::Other => "OTHER",
            Self::Report => "REPORT",
            Self::Unlisted(code) => code,
        }
    }

    /// Working papers are pre-publication drafts, dropped when a published
    /// sibling with the same normalized title exists.
    pub fn is_working_paper(&self) -> bool {
        matches!(self, Self::Undefined | Self::Other | Self::Report)
    }

    /// Survivor priority inside a DOI group (lower wins).
    pub fn doi_priority(&self) -> u8 {
        match self {
            Self::Article => 1,
            Self::Communication => 2,
            Self::Undefined => 3,
            _ => 99,
        }
    }
}

impl Default for DocType {
    fn default() -> Self {
        Self::Unlisted(String::new())
    }
}

impl From<String> for DocType {
    fn from(code: String) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "ART" => Self::Article,
            "COMM" => Self::Communication,
            "OUV" => Self::Book,
            "COUV" => Self::BookChapter,
            "UNDEFINED" => Self::Undefined,
            "OTHER" => Self::Other,
            "REPORT" => Self::Report,
            _ => Self::Unlisted(code),
        }
    }
}

impl From<DocType> for String {
    fn from(doc_type: DocType) -> Self {
        match doc_type {
            DocType::Unlisted(code) => code,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bibliographic record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Internal numeric id of the source (larger = indexed more recently)
    #[serde(default, deserialize_with = "de_docid")]
    pub docid: u64,
    #[serde(rename = "halId_s", default, deserialize_with = "de_scalar")]
    pub hal_id: String,
    #[serde(
        rename = "doiId_s",
        default,
        deserialize_with = "de_scalar",
        skip_serializing_if = "String::is_empty"
    )]
    pub doi: String,
    /// Possibly multilingual; the first element is canonical.
    #[serde(rename = "title_s", default, deserialize_with = "de_one_or_many")]
    pub titles: Vec<String>,
    /// Formatted citation
    #[serde(rename = "label_s", default, deserialize_with = "de_scalar")]
    pub citation: String,
    #[serde(
        rename = "abstract_s",
        default,
        deserialize_with = "de_one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub abstracts: Vec<String>,
    #[serde(rename = "docType_s", default)]
    pub doc_type: DocType,
    #[serde(
        rename = "producedDate_tdate",
        default,
        deserialize_with = "de_day",
        skip_serializing_if = "Option::is_none"
    )]
    pub produced_date: Option<NaiveDate>,
    #[serde(
        rename = "authFullName_s",
        default,
        deserialize_with = "de_one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub authors: Vec<String>,
    #[serde(
        rename = "fileMain_s",
        default,
        deserialize_with = "de_opt_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_main: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf_url: Option<String>,
    /// Fields not interpreted here
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Publication {
    /// First title, or empty.
    pub fn title(&self) -> &str {
        self.titles.first().map(String::as_str).unwrap_or("")
    }

    /// First abstract, or empty.
    pub fn abstract_text(&self) -> &str {
        self.abstracts.first().map(String::as_str).unwrap_or("")
    }

    pub fn normalized_title(&self) -> String {
        normalize_title(self.title())
    }

    /// Fulltext URL, if the source advertises one.
    pub fn fulltext_url(&self) -> Option<&str> {
        self.file_main
            .as_deref()
            .or(self.pdf_url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }

    pub fn has_fulltext(&self) -> bool {
        self.fulltext_url().is_some()
    }

    /// Case-folded DOI, `None` when absent.
    pub fn doi_key(&self) -> Option<String> {
        doi_key(&self.doi)
    }

    /// Affiliated lab structure acronyms (`labStructAcronym_s`).
    pub fn lab_acronyms(&self) -> Vec<&str> {
        match self.extra.get("labStructAcronym_s") {
            Some(Value::String(s)) => vec![s.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        if !self.hal_id.is_empty() {
            self.hal_id.clone()
        } else {
            format!("docid:{}", self.docid)
        }
    }
}

fn scalar_from(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.into_iter().find_map(scalar_from),
        Value::Null | Value::Object(_) => None,
    }
}

/// Internal id: the source sends a number, older exports a string.
fn de_docid<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    })
}

/// Scalar text field that may arrive as a one-element list.
fn de_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_from(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn de_opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_from(Value::deserialize(deserializer)?))
}

/// Multi-valued text field that may arrive as a bare string.
fn de_one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_from).collect(),
        other => scalar_from(other).into_iter().collect(),
    })
}

/// Timestamp truncated to its calendar day.
fn de_day<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = scalar_from(Value::deserialize(deserializer)?);
    Ok(raw.as_deref().and_then(truncate_to_day))
}
