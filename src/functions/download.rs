//! Download a remote file into the conversation's working storage

use super::{parse_args, storage_path, Arguments, Function, FunctionError, STORAGE_DIR_PARAM};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;
const FALLBACK_NAME: &str = "download";

pub struct DownloadFile {
    client: Client,
    max_bytes: u64,
}

impl Default for DownloadFile {
    fn default() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_bytes: MAX_DOWNLOAD_BYTES,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DownloadInput {
    url: String,
    #[serde(default)]
    filename: Option<String>,
    storage_dir: PathBuf,
}

/// Last non-empty path segment of the URL, without query or fragment
fn name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    let mut segments = after_scheme.split('/');
    segments.next(); // host
    segments
        .rfind(|s| !s.is_empty())
        .map_or_else(|| FALLBACK_NAME.to_string(), str::to_string)
}

impl DownloadFile {
    /// Stream the body into `path`, enforcing the size cap as bytes arrive
    async fn save_body(&self, response: Response, path: &Path) -> Result<u64, FunctionError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FunctionError::Upstream(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FunctionError::Upstream(format!(
                    "file exceeds {} bytes",
                    self.max_bytes
                )));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl Function for DownloadFile {
    fn name(&self) -> &'static str {
        "download_file"
    }

    fn description(&self) -> String {
        "Download a file from a URL into this conversation's workspace so it can be read later"
            .to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "HTTP(S) URL of the file"},
                "filename": {
                    "type": "string",
                    "description": "Name to save the file under (defaults to the URL's last path segment)"
                }
            },
            "required": ["url"]
        })
    }

    fn accepted_parameters(&self) -> &'static [&'static str] {
        &["url", "filename", STORAGE_DIR_PARAM]
    }

    async fn call(&self, args: Arguments) -> Result<String, FunctionError> {
        let input: DownloadInput = parse_args(args)?;
        if !(input.url.starts_with("http://") || input.url.starts_with("https://")) {
            return Err(FunctionError::InvalidArguments(format!(
                "unsupported URL: {}",
                input.url
            )));
        }

        let name = input
            .filename
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name_from_url(&input.url));
        let target = storage_path(&input.storage_dir, &name)?;

        let response = self
            .client
            .get(&input.url)
            .send()
            .await
            .map_err(|e| FunctionError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FunctionError::Upstream(format!(
                "{} returned {status}",
                input.url
            )));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FunctionError::Upstream(format!(
                "file exceeds {} bytes",
                self.max_bytes
            )));
        }

        let partial = input.storage_dir.join(format!(".{}.part", name.trim()));
        let written = match self.save_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        tracing::info!(url = %input.url, file = %name, bytes = written, "Downloaded file");
        Ok(format!("Saved {name} ({written} bytes)"))
    }
}
