//! Common types for completion-service interactions

use serde::{Deserialize, Serialize};

/// Message role, as understood by the chat completions API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a function invocation, replayed to the model
    Function,
}

/// One dialogue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Null for pure function-call entries
    pub content: Option<String>,
    /// Originating function, set on function-result entries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            name: None,
        }
    }

    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(content.into()),
            name: Some(name.into()),
        }
    }
}

/// Function advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Incremental unit decoded from the upstream stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Text fragment, forwarded verbatim (may be empty)
    Content(String),
    /// Function-call fragment. The name usually arrives once, first; arguments
    /// are spread over any number of later fragments.
    FunctionCall {
        name: Option<String>,
        arguments: Option<String>,
    },
}

impl Delta {
    pub fn content(text: impl Into<String>) -> Self {
        Delta::Content(text.into())
    }

    #[cfg(test)]
    pub fn function_name(name: impl Into<String>) -> Self {
        Delta::FunctionCall {
            name: Some(name.into()),
            arguments: None,
        }
    }

    #[cfg(test)]
    pub fn function_arguments(fragment: impl Into<String>) -> Self {
        Delta::FunctionCall {
            name: None,
            arguments: Some(fragment.into()),
        }
    }
}
