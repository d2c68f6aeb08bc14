//! Function-call argument assembly
//!
//! Argument text arrives as arbitrary fragments. Completion is tracked with a
//! structural-balance counter over `{}`/`[]`, ignoring bracket characters that
//! appear inside JSON strings.

use crate::functions::Arguments;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("arguments are incomplete")]
    Incomplete,
    #[error("arguments are not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("arguments must be a JSON object")]
    NotAnObject,
}

/// Accumulates one function call's name and argument fragments
#[derive(Debug, Default)]
pub struct ArgumentAssembler {
    name: Option<String>,
    text: String,
    depth: usize,
    opened: bool,
    in_string: bool,
    escaped: bool,
    /// A closing bracket arrived with nothing open
    unbalanced: bool,
}

impl ArgumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the function name; the first one seen wins
    pub fn push_name(&mut self, name: &str) {
        if self.name.is_none() && !name.is_empty() {
            self.name = Some(name.to_string());
        }
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        for c in fragment.chars() {
            self.scan(c);
        }
    }

    fn scan(&mut self, c: char) {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            return;
        }

        match c {
            '"' => self.in_string = true,
            '{' | '[' => {
                self.depth += 1;
                self.opened = true;
            }
            '}' | ']' => match self.depth.checked_sub(1) {
                Some(depth) => self.depth = depth,
                None => self.unbalanced = true,
            },
            _ => {}
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Raw argument text received so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// At least one bracket opened and everything opened has closed
    pub fn is_complete(&self) -> bool {
        self.opened && self.depth == 0 && !self.in_string && !self.unbalanced
    }

    /// Whether waiting for more fragments could help
    pub fn needs_more(&self) -> bool {
        !self.unbalanced && !self.is_complete() && !self.text.trim().is_empty()
    }

    /// Deserialize the accumulated text as a JSON object.
    ///
    /// Empty text is the empty record.
    pub fn finish(&self) -> Result<Arguments, ArgumentError> {
        if self.text.trim().is_empty() {
            return Ok(Arguments::new());
        }
        if !self.is_complete() {
            return Err(ArgumentError::Incomplete);
        }
        match serde_json::from_str::<Value>(&self.text)? {
            Value::Object(map) => Ok(map),
            _ => Err(ArgumentError::NotAnObject),
        }
    }
}
