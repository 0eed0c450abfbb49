use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ http_stream_tokens, ChatClient, CompletionResponse, StreamEvent, TokenStream };
use crate::llm::{ ChatTurn, LlmConfig, LlmType };

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

/// Gemini names the assistant role "model" and takes system text as a
/// separate instruction block.
fn build_request(turns: &[ChatTurn]) -> GeminiRequest {
    let system: Vec<&str> = turns
        .iter()
        .filter(|t| t.role == "system")
        .map(|t| t.content.as_str())
        .collect();
    let contents = turns
        .iter()
        .filter(|t| t.role != "system")
        .map(|t| GeminiContent {
            role: Some(
                (if t.role == "assistant" { "model" } else { "user" }).to_string()
            ),
            parts: vec![GeminiPart { text: t.content.clone() }],
        })
        .collect();
    let system_instruction = if system.is_empty() {
        None
    } else {
        Some(GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: system.join("\n") }],
        })
    };
    GeminiRequest {
        contents,
        system_instruction,
    }
}

pub fn parse_stream_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim();
    let parsed = serde_json::from_str::<GeminiResponse>(data).ok()?;
    let text: String = parsed.candidates
        .first()?
        .content.parts.iter()
        .map(|p| p.text.as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(StreamEvent::Token(text))
    }
}

impl GeminiChatClient {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_key,
            model: model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            base_url: base_url.unwrap_or_else(||
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            ),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Gemini {
            return Err("Invalid config type for GeminiChatClient".into());
        }
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Gemini API key is required".to_string())?;
        Ok(Self::new(api_key, config.model.clone(), config.base_url.clone()))
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        turns: &[ChatTurn]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let req = build_request(turns);
        let resp = self.http
            .post(self.generate_url())
            .json(&req)
            .send().await?
            .error_for_status()?;
        let data = resp.json::<GeminiResponse>().await?;
        let text: String = data.candidates
            .first()
            .map(|c|
                c.content.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect()
            )
            .ok_or("Gemini response contained no candidates")?;
        Ok(CompletionResponse { response: text })
    }

    async fn complete_stream(
        &self,
        turns: &[ChatTurn]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let req = build_request(turns);
        let request = self.http.post(self.stream_url()).json(&req);
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
    fn assistant_turns_map_to_model_role() {
        let req = build_request(
            &[turn("system", "be brief"), turn("user", "hi"), turn("assistant", "hello")]
        );
        assert_eq!(req.contents.len(), 2);
        assert_eq!(req.contents[0].role.as_deref(), Some("user"));
        assert_eq!(req.contents[1].role.as_deref(), Some("model"));
        assert_eq!(
            req.system_instruction.unwrap().parts[0].text,
            "be brief"
        );
    }

    #[test]
    fn stream_line_concatenates_candidate_parts() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        match parse_stream_line(line) {
            Some(StreamEvent::Token(tok)) => assert_eq!(tok, "Hello"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn empty_or_foreign_lines_are_skipped() {
        assert!(parse_stream_line(r#"data: {"candidates":[]}"#).is_none());
        assert!(parse_stream_line("not sse").is_none());
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = LlmConfig {
            llm_type: LlmType::Gemini,
            ..Default::default()
        };
        assert!(GeminiChatClient::from_config(&config).is_err());
    }
}
