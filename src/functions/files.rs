//! Listing and reading files in a conversation's working storage

use super::{parse_args, storage_path, Arguments, Function, FunctionError, STORAGE_DIR_PARAM};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

const DEFAULT_MAX_CHARS: usize = 20_000;

pub struct ListFiles;

pub struct ReadFile;

#[derive(Debug, Deserialize)]
struct ListInput {
    storage_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ReadInput {
    filename: String,
    #[serde(default)]
    max_chars: Option<usize>,
    storage_dir: PathBuf,
}

#[async_trait]
impl Function for ListFiles {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn description(&self) -> String {
        "List the files downloaded into this conversation's workspace".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn accepted_parameters(&self) -> &'static [&'static str] {
        &[STORAGE_DIR_PARAM]
    }

    async fn call(&self, args: Arguments) -> Result<String, FunctionError> {
        let input: ListInput = parse_args(args)?;

        let mut entries = match tokio::fs::read_dir(&input.storage_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok("No files".to_string());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                files.push(json!({
                    "name": entry.file_name().to_string_lossy(),
                    "bytes": meta.len(),
                }));
            }
        }

        if files.is_empty() {
            return Ok("No files".to_string());
        }
        files.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(Value::Array(files).to_string())
    }
}

#[async_trait]
impl Function for ReadFile {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> String {
        "Read a text file from this conversation's workspace".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": {"type": "string", "description": "Name of a previously downloaded file"},
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum number of characters to return"
                }
            },
            "required": ["filename"]
        })
    }

    fn accepted_parameters(&self) -> &'static [&'static str] {
        &["filename", "max_chars", STORAGE_DIR_PARAM]
    }

    async fn call(&self, args: Arguments) -> Result<String, FunctionError> {
        let input: ReadInput = parse_args(args)?;
        let path = storage_path(&input.storage_dir, &input.filename)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FunctionError::InvalidArguments(format!(
                    "no file named '{}'",
                    input.filename
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let text = String::from_utf8_lossy(&bytes);
        let limit = input.max_chars.unwrap_or(DEFAULT_MAX_CHARS);
        let total = text.chars().count();
        if total <= limit {
            return Ok(text.into_owned());
        }

        let mut truncated: String = text.chars().take(limit).collect();
        truncated.push_str(&format!("\n\n[truncated: showing {limit} of {total} characters]"));
        Ok(truncated)
    }
}
