//! System messages that seed every new conversation

use crate::llm::ChatMessage;

/// Primary role statement
const BASE_PROMPT: &str =
    "You are a helpful assistant who can provide various information, including the current time.";

/// Guidance on function use and output format
const FUNCTION_GUIDANCE: &str = r"You are a helpful assistant. You can call functions to get additional information when needed.

- Respond in markdown format";

/// Build the seed history for a new conversation.
///
/// `override_prompt` replaces the primary role statement; the function
/// guidance is always kept.
pub fn seed_messages(override_prompt: Option<&str>) -> Vec<ChatMessage> {
    let base = override_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(BASE_PROMPT);

    vec![ChatMessage::system(base), ChatMessage::system(FUNCTION_GUIDANCE)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_default_seed() {
        let seed = seed_messages(None);
        assert_eq!(seed.len(), 2);
        assert!(seed.iter().all(|m| m.role == Role::System));
        assert_eq!(seed[0].content.as_deref(), Some(BASE_PROMPT));
        assert!(seed[1]
            .content
            .as_deref()
            .is_some_and(|c| c.contains("markdown")));
    }

    #[test]
    fn test_override_replaces_primary_only() {
        let seed = seed_messages(Some("You are a pirate."));
        assert_eq!(seed[0].content.as_deref(), Some("You are a pirate."));
        assert_eq!(seed[1].content.as_deref(), Some(FUNCTION_GUIDANCE));
    }

    #[test]
    fn test_blank_override_ignored() {
        let seed = seed_messages(Some("   "));
        assert_eq!(seed[0].content.as_deref(), Some(BASE_PROMPT));
    }
}
