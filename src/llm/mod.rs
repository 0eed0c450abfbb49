pub mod chat;

use crate::models::tree::Message;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Ollama,
    OpenAI,
    Anthropic,
    Gemini,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(LlmType::Ollama),
            "openai" => Ok(LlmType::OpenAI),
            "anthropic" => Ok(LlmType::Anthropic),
            "gemini" => Ok(LlmType::Gemini),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Ollama,
            api_key: None,
            model: None,
            base_url: None,
        }
    }
}

/// One role+content pair on the wire. Every provider request is built from
/// these; providers needing a different shape convert from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Maps a thread's message sequence into provider-ready turns, dropping
/// everything but role and content.
pub fn to_chat_turns(messages: &[Message]) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| ChatTurn {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tree::Role;

    #[test]
    fn llm_type_parses_known_providers() {
        assert_eq!("ollama".parse::<LlmType>().unwrap(), LlmType::Ollama);
        assert_eq!("OpenAI".parse::<LlmType>().unwrap(), LlmType::OpenAI);
        assert_eq!("ANTHROPIC".parse::<LlmType>().unwrap(), LlmType::Anthropic);
        assert_eq!("gemini".parse::<LlmType>().unwrap(), LlmType::Gemini);
        assert!("cohere".parse::<LlmType>().is_err());
    }

    #[test]
    fn chat_turns_carry_role_and_content_only() {
        let messages = vec![
            Message {
                id: "m1".to_string(),
                role: Role::System,
                content: "be brief".to_string(),
                created_at: 1,
            },
            Message {
                id: "m2".to_string(),
                role: Role::User,
                content: "hi".to_string(),
                created_at: 2,
            }
        ];
        let turns = to_chat_turns(&messages);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "system");
        assert_eq!(turns[1].content, "hi");
    }
}
