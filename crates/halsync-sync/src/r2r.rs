//! HTTP client for an R2R document store (`/v3/documents` API).

use std::collections::BTreeMap;
use std::path::Path;

use halsync_core::{HttpError, SHARED_RUNTIME, http_client, retry_with_backoff};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::store::{DocumentPage, DocumentStore, StoreError};

/// Longest server error body echoed into an error message
const MAX_ERROR_DETAIL: usize = 200;

/// Collections fetched per request while resolving a name
const COLLECTION_PAGE: usize = 100;

/// Synchronous R2R client over the shared async runtime.
#[derive(Debug, Clone)]
pub struct R2rClient {
    base_url: String,
    api_key: Option<String>,
}

impl R2rClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3/{path}", self.base_url)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = http_client().request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Id of the collection called `name`. Uploads reference collections by
    /// id; a value that already is one is returned unchanged.
    pub fn resolve_collection(&self, name: &str) -> Result<String, StoreError> {
        if looks_like_id(name) {
            return Ok(name.to_string());
        }
        let url = self.url("collections");
        let mut offset = 0;
        loop {
            let body = self.send_with_retry("list collections", || {
                self.request(Method::GET, &url)
                    .query(&[("offset", offset), ("limit", COLLECTION_PAGE)])
            })?;
            let Value::Array(page) = results(body) else {
                return Err(HttpError::Decode(
                    "collection list: expected an array of results".into(),
                ));
            };
            if let Some(id) = collection_named(&page, name) {
                log::debug!("Collection '{name}' is {id}");
                return Ok(id);
            }
            if page.len() < COLLECTION_PAGE {
                return Err(HttpError::Decode(format!("no collection named '{name}'")));
            }
            offset += page.len();
        }
    }

    /// Send an idempotent request, retrying transient failures.
    fn send_with_retry(
        &self,
        label: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<Value, StoreError> {
        retry_with_backoff(label, || {
            SHARED_RUNTIME.handle().block_on(async {
                let resp = build().send().await.map_err(HttpError::from_reqwest)?;
                read_json(resp).await
            })
        })
    }
}

/// Short human-readable reason from an error body.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "message", "error"]
            .iter()
            .find_map(|k| v.get(k).and_then(Value::as_str).map(str::to_string))
    });
    from_json.unwrap_or_else(|| body.trim().chars().take(MAX_ERROR_DETAIL).collect())
}

async fn read_json(resp: reqwest::Response) -> Result<Value, HttpError> {
    let status = resp.status();
    let text = resp.text().await.map_err(HttpError::from_reqwest)?;
    if !status.is_success() {
        return Err(HttpError::Http {
            status: Some(status.as_u16()),
            message: error_detail(&text),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Canonical hyphenated UUID form: 8-4-4-4-12 hex digits.
fn looks_like_id(value: &str) -> bool {
    let groups: Vec<&str> = value.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Id of the first collection record whose `name` is `name`.
fn collection_named(page: &[Value], name: &str) -> Option<String> {
    page.iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|c| c.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

/// The `results` member of an R2R envelope.
fn results(mut body: Value) -> Value {
    if let Some(inner) = body.get_mut("results") {
        return inner.take();
    }
    body
}

impl DocumentStore for R2rClient {
    fn list(&self, limit: usize, offset: usize) -> Result<DocumentPage, StoreError> {
        let url = self.url("documents");
        let body = self.send_with_retry("list documents", || {
            self.request(Method::GET, &url)
                .query(&[("offset", offset), ("limit", limit)])
        })?;
        let total_entries = body.get("total_entries").and_then(Value::as_u64);
        match results(body) {
            Value::Array(results) => Ok(DocumentPage {
                results,
                total_entries,
            }),
            other => Err(HttpError::Decode(format!(
                "document list: expected an array of results, got {other}"
            ))),
        }
    }

    fn retrieve(&self, id: &str) -> Result<Value, StoreError> {
        let url = self.url(&format!("documents/{id}"));
        let body = self.send_with_retry("retrieve document", || self.request(Method::GET, &url))?;
        Ok(results(body))
    }

    fn create(
        &self,
        file: &Path,
        metadata: &BTreeMap<String, String>,
        collection: Option<&str>,
    ) -> Result<String, StoreError> {
        let url = self.url("documents");
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let metadata_json = serde_json::to_string(metadata)?;
        let collection_json = collection
            .map(|c| serde_json::to_string(&[c]))
            .transpose()?;

        // Not retried: a timed-out create may still have been ingested, and
        // the next run sees it either way.
        let body = SHARED_RUNTIME.handle().block_on(async {
            let bytes = tokio::fs::read(file).await?;
            let mime = infer::get(&bytes)
                .map(|t| t.mime_type())
                .unwrap_or("application/octet-stream");
            let part = Part::bytes(bytes)
                .file_name(file_name)
                .mime_str(mime)
                .map_err(HttpError::from_reqwest)?;

            let mut form = Form::new().part("file", part);
            if !metadata.is_empty() {
                form = form.text("metadata", metadata_json);
            }
            if let Some(ids) = collection_json {
                form = form.text("collection_ids", ids);
            }

            let resp = self
                .request(Method::POST, &url)
                .multipart(form)
                .send()
                .await
                .map_err(HttpError::from_reqwest)?;
            read_json(resp).await
        })?;

        results(body)
            .get("document_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HttpError::Decode("create: response has no document_id".into()))
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let url = self.url(&format!("documents/{id}"));
        self.send_with_retry("delete document", || self.request(Method::DELETE, &url))?;
        Ok(())
    }

    fn append_metadata(&self, id: &str, metadata: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let url = self.url(&format!("documents/{id}/metadata"));
        // The endpoint merges each object of the list into the stored metadata
        let body = [metadata];
        self.send_with_retry("update document metadata", || {
            self.request(Method::PATCH, &url).json(&body)
        })?;
        Ok(())
    }
}
