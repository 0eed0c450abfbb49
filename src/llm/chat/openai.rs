use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_tokens, ChatClient, CompletionResponse, StreamEvent, TokenStream };
use crate::llm::{ ChatTurn, LlmConfig, LlmType };

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

/// SSE line parser for the chat completions stream: `data: {json}` payloads
/// carrying content deltas, terminated by the `[DONE]` sentinel.
pub fn parse_stream_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }
    let parsed = serde_json::from_str::<OpenAIStreamResponse>(data).ok()?;
    let content = parsed.choices.first()?.delta.content.as_ref()?;
    if content.is_empty() {
        None
    } else {
        Some(StreamEvent::Token(content.clone()))
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                format!("Invalid API key format: {}", e)
            )?
        );
        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: model.unwrap_or_else(|| "gpt-4o".to_string()),
            base_url: base_url.unwrap_or_else(||
                "https://api.openai.com/v1/chat/completions".to_string()
            ),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::OpenAI {
            return Err("Invalid config type for OpenAIChatClient".into());
        }
        let api_key = config.api_key.clone().ok_or_else(|| "OpenAI API key is required".to_string())?;
        Self::new(api_key, config.model.clone(), config.base_url.clone())
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(
        &self,
        turns: &[ChatTurn]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: turns,
            stream: None,
        };
        let resp = self.http
            .post(&self.base_url)
            .json(&req)
            .send().await?
            .error_for_status()?;
        let data = resp.json::<OpenAIResponse>().await?;
        let content = data.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or("OpenAI response contained no choices")?;
        Ok(CompletionResponse { response: content })
    }

    async fn complete_stream(
        &self,
        turns: &[ChatTurn]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages: turns,
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

    #[test]
    fn stream_line_extracts_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        match parse_stream_line(line) {
            Some(StreamEvent::Token(tok)) => assert_eq!(tok, "Hi"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn done_sentinel_terminates() {
        assert!(matches!(parse_stream_line("data: [DONE]"), Some(StreamEvent::Done)));
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert!(parse_stream_line(": keep-alive").is_none());
        assert!(parse_stream_line(r#"data: {"choices":[{"delta":{}}]}"#).is_none());
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = LlmConfig {
            llm_type: LlmType::OpenAI,
            ..Default::default()
        };
        assert!(OpenAIChatClient::from_config(&config).is_err());
    }
}
