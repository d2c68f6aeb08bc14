//! Process configuration read from the environment

use crate::llm::UpstreamConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_TURNS: usize = 5;
const DEFAULT_ARGUMENT_RETRIES: usize = 2;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// What to do when the model calls a function the registry does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFunctionPolicy {
    /// Report the error and keep going without a function result
    #[default]
    Continue,
    /// Report the error and end the request
    Abort,
}

impl FromStr for UnknownFunctionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(format!("expected 'continue' or 'abort', got '{other}'")),
        }
    }
}

/// Bounds and policies for one request's turn loop
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub max_turns: usize,
    pub argument_retries: usize,
    pub unknown_function: UnknownFunctionPolicy,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            argument_retries: DEFAULT_ARGUMENT_RETRIES,
            unknown_function: UnknownFunctionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upstream: UpstreamConfig,
    pub brave_api_key: Option<String>,
    pub storage_root: PathBuf,
    pub turns: TurnSettings,
    pub session_ttl: Option<Duration>,
    pub system_prompt: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = UpstreamConfig::default();
        let timeout_secs = parse_or(&get, "CHAT_UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let upstream = UpstreamConfig {
            api_key: non_empty(get("OPENAI_API_KEY")),
            base_url: non_empty(get("OPENAI_BASE_URL")).unwrap_or(defaults.base_url),
            model: non_empty(get("OPENAI_MODEL")).unwrap_or(defaults.model),
            timeout: Duration::from_secs(timeout_secs),
        };

        let storage_root = non_empty(get("CHAT_STORAGE_ROOT"))
            .map_or_else(|| std::env::temp_dir().join("toolchat-sessions"), PathBuf::from);

        let turns = TurnSettings {
            max_turns: parse_or(&get, "CHAT_MAX_TURNS", DEFAULT_MAX_TURNS).max(1),
            argument_retries: parse_or(&get, "CHAT_ARGUMENT_RETRIES", DEFAULT_ARGUMENT_RETRIES),
            unknown_function: parse_or(&get, "CHAT_UNKNOWN_FUNCTION", UnknownFunctionPolicy::default()),
        };

        let session_ttl = get("CHAT_SESSION_TTL_SECS").and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(0) => None,
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "Ignoring invalid CHAT_SESSION_TTL_SECS");
                None
            }
        });

        Self {
            port: parse_or(&get, "CHAT_PORT", DEFAULT_PORT),
            upstream,
            brave_api_key: non_empty(get("BRAVE_API_KEY")),
            storage_root,
            turns,
            session_ttl,
            system_prompt: non_empty(get("CHAT_SYSTEM_PROMPT")),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "Invalid value, using default");
            default
        }),
    }
}
