use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_tokens, ChatClient, CompletionResponse, StreamEvent, TokenStream };
use crate::llm::{ ChatTurn, LlmConfig, LlmType };

#[derive(Debug)]
pub struct OllamaChatClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaStreamLine {
    message: Option<OllamaMessage>,
    done: bool,
}

pub fn parse_stream_line(line: &str) -> Option<StreamEvent> {
    let parsed = serde_json::from_str::<OllamaStreamLine>(line).ok()?;
    if let Some(msg) = parsed.message {
        if !msg.content.is_empty() {
            return Some(StreamEvent::Token(msg.content));
        }
    }
    if parsed.done {
        return Some(StreamEvent::Done);
    }
    None
}

impl OllamaChatClient {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3".to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Ollama {
            return Err("Invalid config type for OllamaChatClient".into());
        }
        Ok(Self::new(config.base_url.clone(), config.model.clone()))
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn complete(
        &self,
        turns: &[ChatTurn]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let req = OllamaChatRequest {
            model: &self.model,
            messages: turns,
            stream: false,
        };
        let resp = self.http
            .post(self.chat_url())
            .json(&req)
            .send().await?
            .error_for_status()?;
        let data = resp.json::<OllamaChatResponse>().await?;
        Ok(CompletionResponse { response: data.message.content })
    }

    async fn complete_stream(
        &self,
        turns: &[ChatTurn]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let req = OllamaChatRequest {
            model: &self.model,
            messages: turns,
            stream: true,
        };
        let request = self.http.post(self.chat_url()).json(&req);
        http_stream_tokens(request, parse_stream_line).await
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_line_yields_token() {
        let line = r#"{"message":{"content":"Hel"},"done":false}"#;
        match parse_stream_line(line) {
            Some(StreamEvent::Token(tok)) => assert_eq!(tok, "Hel"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn stream_line_done_terminates() {
        let line = r#"{"message":{"content":""},"done":true}"#;
        assert!(matches!(parse_stream_line(line), Some(StreamEvent::Done)));
    }

    #[test]
    fn unparsable_line_is_skipped() {
        assert!(parse_stream_line("garbage").is_none());
    }

    #[test]
    fn from_config_rejects_wrong_type() {
        let config = LlmConfig {
            llm_type: LlmType::OpenAI,
            ..Default::default()
        };
        assert!(OllamaChatClient::from_config(&config).is_err());
    }
}
