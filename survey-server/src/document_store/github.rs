//! GitHub repository contents as a document store
//!
//! Uses the REST contents API: one commit per created file.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use survey_common::config::SurveyConfig;

use super::{DocumentEntry, DocumentStore, DocumentStoreError};

const USER_AGENT: &str = concat!("survey-server/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Entry of a directory listing
#[derive(Debug, Deserialize)]
struct ContentsItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    item_type: String,
}

/// Single file as returned by the contents API
#[derive(Debug, Deserialize)]
struct ContentsFile {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
    download_url: Option<String>,
}

/// Document store backed by a GitHub repository
pub struct GitHubDocumentStore {
    http_client: reqwest::Client,
    api_url: String,
    repo_name: String,
    token: String,
}

impl GitHubDocumentStore {
    pub fn new(
        api_url: impl Into<String>,
        repo_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, DocumentStoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repo_name: repo_name.into(),
            token: token.into(),
        })
    }

    pub fn from_config(config: &SurveyConfig) -> Result<Self, DocumentStoreError> {
        Self::new(&config.github_api_url, &config.repo_name, &config.github_token)
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            self.repo_name,
            path.trim_matches('/')
        )
    }

    async fn error_from(response: reqwest::Response) -> DocumentStoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        DocumentStoreError::Api {
            status,
            message: api_message(&body),
        }
    }
}

#[async_trait]
impl DocumentStore for GitHubDocumentStore {
    async fn create_file(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
    ) -> Result<(), DocumentStoreError> {
        let url = self.contents_url(path);
        tracing::debug!(path = %path, "Creating document");

        let response = self
            .http_client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({
                "message": message,
                "content": STANDARD.encode(content),
            }))
            .send()
            .await
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<DocumentEntry>, DocumentStoreError> {
        let url = self.contents_url(prefix);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;

        if response.status() == 404 {
            tracing::info!(prefix = %prefix, "Document directory does not exist yet");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;
        parse_listing(&bytes)
    }

    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, DocumentStoreError> {
        let url = self.contents_url(path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;

        if response.status() == 404 {
            return Err(DocumentStoreError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let file: ContentsFile = response
            .json()
            .await
            .map_err(|e| DocumentStoreError::Parse(e.to_string()))?;

        if file.encoding == "base64" {
            return decode_content(&file.content);
        }

        // Files over 1 MB come back without inline content
        let download_url = file
            .download_url
            .ok_or_else(|| DocumentStoreError::Parse(format!("no content for {}", path)))?;
        let response = self
            .http_client
            .get(&download_url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DocumentStoreError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Files of a directory listing, sorted by path
fn parse_listing(body: &[u8]) -> Result<Vec<DocumentEntry>, DocumentStoreError> {
    let items: Vec<ContentsItem> =
        serde_json::from_slice(body).map_err(|e| DocumentStoreError::Parse(e.to_string()))?;

    let mut entries: Vec<DocumentEntry> = items
        .into_iter()
        .filter(|item| item.item_type == "file")
        .map(|item| DocumentEntry {
            path: item.path,
            name: item.name,
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Inline content is base64 wrapped at 60 columns
fn decode_content(encoded: &str) -> Result<Vec<u8>, DocumentStoreError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| DocumentStoreError::Parse(e.to_string()))
}

/// `message` field of a GitHub error body, else the raw body
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contents_url() {
        let store = GitHubDocumentStore::new("https://api.github.com/", "acme/survey", "t").unwrap();
        assert_eq!(
            store.contents_url("responses/a.json"),
            "https://api.github.com/repos/acme/survey/contents/responses/a.json"
        );
        assert_eq!(
            store.contents_url("responses/"),
            "https://api.github.com/repos/acme/survey/contents/responses"
        );
    }

    #[test]
    fn test_parse_listing_keeps_files_only() {
        let body = br#"[
            {"name": "b.json", "path": "responses/b.json", "type": "file", "sha": "2"},
            {"name": "old", "path": "responses/old", "type": "dir", "sha": "3"},
            {"name": "a.json", "path": "responses/a.json", "type": "file", "sha": "1"}
        ]"#;

        let entries = parse_listing(body).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["responses/a.json", "responses/b.json"]);
    }

    #[test]
    fn test_parse_listing_rejects_single_file_body() {
        let body = br#"{"name": "responses", "type": "file"}"#;
        assert!(matches!(parse_listing(body), Err(DocumentStoreError::Parse(_))));
    }

    #[test]
    fn test_decode_wrapped_content() {
        let encoded = STANDARD.encode("{\"bm_yes_no\": \"Sì\"}");
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{}\n{}\n", head, tail);

        let decoded = decode_content(&wrapped).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "{\"bm_yes_no\": \"Sì\"}");
    }

    #[test]
    fn test_api_message_extraction() {
        assert_eq!(
            api_message(r#"{"message": "Invalid request.\n\n\"sha\" wasn't supplied."}"#),
            "Invalid request.\n\n\"sha\" wasn't supplied."
        );
        assert_eq!(api_message("Bad gateway"), "Bad gateway");
    }
}
