use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_tokens, ChatClient, CompletionResponse, StreamEvent, TokenStream };
use crate::llm::{ ChatTurn, LlmConfig, LlmType };

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<&'a ChatTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<AnthropicDelta>,
}

#[derive(Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: String,
}

/// The messages API takes system text as a top-level field; user/assistant
/// turns stay in the message list.
fn split_system(turns: &[ChatTurn]) -> (Option<String>, Vec<&ChatTurn>) {
    let system: Vec<&str> = turns
        .iter()
        .filter(|t| t.role == "system")
        .map(|t| t.content.as_str())
        .collect();
    let rest = turns
        .iter()
        .filter(|t| t.role != "system")
        .collect();
    let system = if system.is_empty() { None } else { Some(system.join("\n")) };
    (system, rest)
}

pub fn parse_stream_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim();
    let parsed = serde_json::from_str::<AnthropicStreamEvent>(data).ok()?;
    match parsed.event_type.as_str() {
        "content_block_delta" => {
            let text = parsed.delta?.text;
            if text.is_empty() {
                None
            } else {
                Some(StreamEvent::Token(text))
            }
        }
        "message_stop" => Some(StreamEvent::Done),
        _ => None,
    }
}

impl AnthropicChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key).map_err(|e| format!("Invalid API key format: {}", e))?
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: model.unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
            base_url: base_url.unwrap_or_else(||
                "https://api.anthropic.com/v1/messages".to_string()
            ),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Anthropic {
            return Err("Invalid config type for AnthropicChatClient".into());
        }
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Anthropic API key is required".to_string())?;
        Self::new(api_key, config.model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    async fn complete(
        &self,
        turns: &[ChatTurn]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let (system, messages) = split_system(turns);
        let req = AnthropicRequest {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages,
            system,
            stream: None,
        };
        let resp = self.http
            .post(&self.base_url)
            .json(&req)
            .send().await?
            .error_for_status()?;
        let data = resp.json::<AnthropicResponse>().await?;
        let text = data.content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(CompletionResponse { response: text })
    }

    async fn complete_stream(
        &self,
        turns: &[ChatTurn]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let (system, messages) = split_system(turns);
        let req = AnthropicRequest {
            model: &self.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages,
            system,
            stream: Some(true),
        };
        let request = self.http.post(&self.base_url).json(&req);
        http_stream_tokens(request, parse_stream_line).await
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, content: &str) -> ChatTurn {
        ChatTurn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn system_turns_are_lifted_out_of_the_message_list() {
        let turns = vec![turn("system", "be brief"), turn("user", "hi"), turn("assistant", "yo")];
        let (system, rest) = split_system(&turns);
        assert_eq!(system.as_deref(), Some("be brief"));
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|t| t.role != "system"));
    }

    #[test]
    fn stream_line_extracts_delta_text() {
        let line = r#"data: {"type":"content_block_delta","delta":{"text":"Hi"}}"#;
        match parse_stream_line(line) {
            Some(StreamEvent::Token(tok)) => assert_eq!(tok, "Hi"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn message_stop_terminates() {
        let line = r#"data: {"type":"message_stop"}"#;
        assert!(matches!(parse_stream_line(line), Some(StreamEvent::Done)));
    }

    #[test]
    fn other_events_are_skipped() {
        let line = r#"data: {"type":"message_start"}"#;
        assert!(parse_stream_line(line).is_none());
        assert!(parse_stream_line("event: ping").is_none());
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = LlmConfig {
            llm_type: LlmType::Anthropic,
            ..Default::default()
        };
        assert!(AnthropicChatClient::from_config(&config).is_err());
    }
}
