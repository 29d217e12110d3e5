//! `halsync.toml`: paths, catalog filters, remote store, upload limits and HTTP tuning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use halsync_sync::MismatchMode;
use serde::Deserialize;

/// Global configuration for halsync
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub catalog: CatalogConfig,
    pub remote: RemoteConfig,
    pub upload: UploadConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw source responses (`hal_response_*.json`)
    pub raw_dir: PathBuf,
    /// Prepared snapshots (`catalog_*.json`)
    pub prepared_dir: PathBuf,
    /// Fixed-path catalog used when no prepared snapshot exists
    pub legacy_catalog: Option<PathBuf>,
    /// Downloaded fulltext files
    pub documents_dir: PathBuf,
    pub blacklist: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("./data/raw"),
            prepared_dir: PathBuf::from("./data/prepared"),
            legacy_catalog: Some(PathBuf::from("./data/hal_publications.json")),
            documents_dir: PathBuf::from("./data/documents"),
            blacklist: PathBuf::from("./data/blacklist.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Lab acronym; records citing it without the lab affiliation are set aside
    pub lab_acronym: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(deserialize_with = "api_key_from_env")]
    pub api_key: Option<String>,
    pub page_size: usize,
    /// Pause between listing pages
    pub page_delay_ms: u64,
    pub collection: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7272".to_string(),
            api_key: std::env::var("R2R_API_KEY").ok(),
            page_size: 250,
            page_delay_ms: 100,
            collection: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Successful creates per run
    pub max_upload: usize,
    /// Bytes
    pub max_file_size: u64,
    pub extension: String,
    pub on_mismatch: MismatchMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload: 5,
            max_file_size: 30_000_000,
            extension: "pdf".to_string(),
            on_mismatch: MismatchMode::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds
    pub request_timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            request_timeout: 60,
            max_retries: 3,
        }
    }
}

/// API keys may be written as `${VAR}` (or contain such references) to keep
/// them out of the file. An unset variable leaves the key unset.
fn api_key_from_env<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| expand_env_refs(&s)).filter(|s| !s.is_empty()))
}

/// Replace every `${VAR}` with its value. `None` if any variable is unset.
fn expand_env_refs(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&std::env::var(&rest[start + 2..start + 2 + len]).ok()?);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Some(out)
}

/// `./halsync.toml`, then the per-user config file.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("halsync.toml")];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "halsync") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}

impl Config {
    /// First config file found among [`candidate_paths`], else defaults.
    pub fn load() -> Result<Self> {
        match candidate_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(&path),
            None => {
                log::debug!("No halsync.toml found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config: Config =
            toml::from_str(&text).with_context(|| format!("Invalid config in {}", path.display()))?;
        log::info!("Using config {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.paths.prepared_dir, PathBuf::from("./data/prepared"));
        assert_eq!(config.remote.base_url, "http://localhost:7272");
        assert_eq!(config.remote.page_size, 250);
        assert_eq!(config.upload.max_upload, 5);
        assert_eq!(config.upload.max_file_size, 30_000_000);
        assert_eq!(config.upload.extension, "pdf");
        assert_eq!(config.upload.on_mismatch, MismatchMode::Delete);
        assert_eq!(config.catalog.lab_acronym, None);
        assert_eq!(config.http.max_retries, 3);
    }

    #[test]
    fn expands_env_references() {
        std::env::set_var("HALSYNC_TEST_KEY", "k123");
        assert_eq!(expand_env_refs("${HALSYNC_TEST_KEY}"), Some("k123".to_string()));
        assert_eq!(
            expand_env_refs("Bearer ${HALSYNC_TEST_KEY}!"),
            Some("Bearer k123!".to_string())
        );
        std::env::remove_var("HALSYNC_TEST_KEY");
    }

    #[test]
    fn literal_and_unterminated_kept() {
        assert_eq!(expand_env_refs("plain"), Some("plain".to_string()));
        assert_eq!(expand_env_refs("a${b"), Some("a${b".to_string()));
    }

    #[test]
    fn unset_variable_unsets_key() {
        assert_eq!(expand_env_refs("${HALSYNC_SURELY_UNSET_98765}"), None);
        let config: Config =
            toml::from_str("[remote]\napi_key = \"${HALSYNC_SURELY_UNSET_98765}\"\n").unwrap();
        assert_eq!(config.remote.api_key, None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[paths]
documents_dir = "/srv/pdfs"

[remote]
base_url = "https://r2r.example.org"
api_key = "secret"
collection = "econ"

[catalog]
lab_acronym = "CIRED"

[upload]
max_upload = 0
on_mismatch = "update"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.paths.documents_dir, PathBuf::from("/srv/pdfs"));
        assert_eq!(config.paths.raw_dir, PathBuf::from("./data/raw"));
        assert_eq!(config.remote.base_url, "https://r2r.example.org");
        assert_eq!(config.remote.api_key.as_deref(), Some("secret"));
        assert_eq!(config.remote.collection.as_deref(), Some("econ"));
        assert_eq!(config.upload.max_upload, 0);
        assert_eq!(config.upload.max_file_size, 30_000_000);
        assert_eq!(config.upload.on_mismatch, MismatchMode::Update);
        assert_eq!(config.catalog.lab_acronym.as_deref(), Some("CIRED"));
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halsync.toml");
        std::fs::write(&path, "[upload\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("halsync.toml"));
        assert!(format!("{err:#}").starts_with("Invalid config"));
    }
}
