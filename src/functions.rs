//! Callable functions advertised to the model
//!
//! Each function declares the parameter schema shown to the model and, separately,
//! every named parameter it accepts. Engine-provided values such as the
//! conversation's storage directory are only passed to functions that declare them.

mod current_time;
mod download;
mod files;
mod random_number;
mod web_search;

pub use current_time::GetCurrentTime;
pub use download::DownloadFile;
pub use files::{ListFiles, ReadFile};
pub use random_number::GetRandomNumber;
pub use web_search::BraveSearch;

use crate::llm::FunctionDefinition;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Parameter through which the engine passes the conversation's working storage
pub const STORAGE_DIR_PARAM: &str = "storage_dir";

/// Named arguments for a function invocation
pub type Arguments = Map<String, Value>;

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Upstream request failed: {0}")]
    Upstream(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to dispatch a call through the registry
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Error calling function {name}: {source}")]
    Failed {
        name: String,
        #[source]
        source: FunctionError,
    },
}

/// A callable operation exposed to the model
#[async_trait]
pub trait Function: Send + Sync {
    /// Function name
    fn name(&self) -> &str;

    /// Description for the model
    fn description(&self) -> String;

    /// JSON schema advertised to the model
    fn parameters(&self) -> Value;

    /// Every named parameter this function accepts, including engine-injected ones
    fn accepted_parameters(&self) -> &'static [&'static str];

    /// Invoke the function; the result is passed back to the model as text
    async fn call(&self, args: Arguments) -> Result<String, FunctionError>;
}

/// Deserialize named arguments into a typed input
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Arguments) -> Result<T, FunctionError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| FunctionError::InvalidArguments(e.to_string()))
}

/// Resolve a file name inside a storage directory, refusing anything that
/// could escape it.
pub(crate) fn storage_path(storage_dir: &Path, file_name: &str) -> Result<PathBuf, FunctionError> {
    let name = file_name.trim();
    let is_plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0');
    if !is_plain {
        return Err(FunctionError::InvalidArguments(format!(
            "'{file_name}' is not a plain file name"
        )));
    }
    Ok(storage_dir.join(name))
}

/// Catalog of functions available to conversations
pub struct FunctionRegistry {
    functions: Vec<Arc<dyn Function>>,
}

impl FunctionRegistry {
    pub fn new(functions: Vec<Arc<dyn Function>>) -> Self {
        Self { functions }
    }

    /// Standard function set; web search is only offered when a key is configured
    pub fn standard(brave_api_key: Option<String>) -> Self {
        let mut functions: Vec<Arc<dyn Function>> = vec![
            Arc::new(GetCurrentTime),
            Arc::new(GetRandomNumber),
            Arc::new(DownloadFile::default()),
            Arc::new(ListFiles),
            Arc::new(ReadFile),
        ];

        if let Some(key) = brave_api_key {
            functions.push(Arc::new(BraveSearch::new(key)));
        } else {
            tracing::info!("BRAVE_API_KEY not set, brave_search disabled");
        }

        Self::new(functions)
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Get all function definitions for the model
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.functions
            .iter()
            .map(|f| FunctionDefinition {
                name: f.name().to_string(),
                description: f.description(),
                parameters: f.parameters(),
            })
            .collect()
    }

    /// Whether `name` exists and declares `param`
    pub fn declares(&self, name: &str, param: &str) -> bool {
        self.find(name)
            .is_some_and(|f| f.accepted_parameters().contains(&param))
    }

    /// Invoke a function by name
    pub async fn dispatch(&self, name: &str, args: Arguments) -> Result<String, DispatchError> {
        let function = self
            .find(name)
            .ok_or_else(|| DispatchError::UnknownFunction(name.to_string()))?;

        function
            .call(args)
            .await
            .map_err(|source| DispatchError::Failed {
                name: name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_standard_registry_without_search_key() {
        let registry = FunctionRegistry::standard(None);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();

        assert!(names.contains(&"get_current_time".to_string()));
        assert!(names.contains(&"get_random_number".to_string()));
        assert!(names.contains(&"download_file".to_string()));
        assert!(!names.contains(&"brave_search".to_string()));
    }

    #[test]
    fn test_standard_registry_with_search_key() {
        let registry = FunctionRegistry::standard(Some("key".to_string()));
        assert!(registry
            .definitions()
            .iter()
            .any(|d| d.name == "brave_search"));
    }

    #[test]
    fn test_storage_param_is_never_advertised() {
        let registry = FunctionRegistry::standard(Some("key".to_string()));
        for def in registry.definitions() {
            assert!(
                def.parameters["properties"].get(STORAGE_DIR_PARAM).is_none(),
                "{} advertises {STORAGE_DIR_PARAM}",
                def.name
            );
        }
    }

    #[test]
    fn test_declared_parameters() {
        let registry = FunctionRegistry::standard(None);
        assert!(registry.declares("download_file", STORAGE_DIR_PARAM));
        assert!(registry.declares("read_file", STORAGE_DIR_PARAM));
        assert!(!registry.declares("get_current_time", STORAGE_DIR_PARAM));
        assert!(!registry.declares("no_such_function", STORAGE_DIR_PARAM));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_function() {
        let registry = FunctionRegistry::standard(None);
        let err = registry.dispatch("nope", Map::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownFunction(ref n) if n == "nope"));
        assert_eq!(err.to_string(), "Unknown function: nope");
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_wrapped() {
        let registry = FunctionRegistry::standard(None);
        let args = json!({"min": 10, "max": 1}).as_object().cloned().unwrap();
        let err = registry
            .dispatch("get_random_number", args)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Failed { ref name, .. } if name == "get_random_number"));
    }

    #[test]
    fn test_storage_path_rejects_escapes() {
        let dir = Path::new("/tmp/session");
        assert!(storage_path(dir, "report.txt").is_ok());
        assert!(storage_path(dir, "../secrets").is_err());
        assert!(storage_path(dir, "a/b.txt").is_err());
        assert!(storage_path(dir, "..").is_err());
        assert!(storage_path(dir, "  ").is_err());
    }
}
