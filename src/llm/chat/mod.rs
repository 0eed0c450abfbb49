pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;

use self::anthropic::AnthropicChatClient;
use self::gemini::GeminiChatClient;
use self::ollama::OllamaChatClient;
use self::openai::OpenAIChatClient;
use super::{ ChatTurn, LlmConfig, LlmType };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type TokenStream = Pin<
    Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>
>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// Provider-neutral chat boundary. Consumes an ordered sequence of turns and
/// yields either one response string or a stream of text fragments. Dropping
/// the returned future/stream cancels the request; nothing downstream of a
/// cancelled request ever reaches the tree.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        turns: &[ChatTurn]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    async fn complete_stream(
        &self,
        turns: &[ChatTurn]
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>>;

    fn model(&self) -> String;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => Arc::new(OllamaChatClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
        LlmType::Anthropic => Arc::new(AnthropicChatClient::from_config(config)?),
        LlmType::Gemini => Arc::new(GeminiChatClient::from_config(config)?),
    };
    Ok(client)
}

/// What a provider's stream-line parser extracted from one wire line.
pub enum StreamEvent {
    Token(String),
    Done,
}

/// Drives a streaming HTTP request and feeds parsed tokens through a
/// bounded channel. Wire bytes are buffered until a full line is available,
/// then handed to the provider's `line_parser`; lines the parser does not
/// recognize are skipped.
pub async fn http_stream_tokens(
    request: reqwest::RequestBuilder,
    line_parser: fn(&str) -> Option<StreamEvent>
) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let _ = tx.send(Err(Box::new(e) as _)).await;
                return;
            }
        };
        if let Err(e) = resp.error_for_status_ref() {
            let _ = tx.send(Err(Box::new(e) as _)).await;
            return;
        }

        let mut bytes = resp.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    buffer.push_str(&String::from_utf8_lossy(&buf));
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        let line = line.trim_end();
                        if line.is_empty() {
                            continue;
                        }
                        match line_parser(line) {
                            Some(StreamEvent::Token(tok)) => {
                                if tx.send(Ok(tok)).await.is_err() {
                                    return;
                                }
                            }
                            Some(StreamEvent::Done) => {
                                return;
                            }
                            None => {}
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                    return;
                }
            }
        }
        // Trailing data without a newline still counts as one line.
        let tail = buffer.trim_end();
        if !tail.is_empty() {
            if let Some(StreamEvent::Token(tok)) = line_parser(tail) {
                let _ = tx.send(Ok(tok)).await;
            }
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

/// Collects a token stream into the full response text. The first stream
/// error aborts the collection; partial text is discarded by the caller.
pub async fn collect_stream(
    mut stream: TokenStream
) -> Result<String, Box<dyn StdError + Send + Sync>> {
    let mut full = String::new();
    while let Some(fragment) = stream.next().await {
        full.push_str(&fragment?);
    }
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_stream_concatenates_fragments() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("Hello".to_string())).await.unwrap();
        tx.send(Ok(", world".to_string())).await.unwrap();
        drop(tx);
        let stream: TokenStream = Box::pin(ReceiverStream::new(rx));
        assert_eq!(collect_stream(stream).await.unwrap(), "Hello, world");
    }

    #[tokio::test]
    async fn collect_stream_propagates_errors() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("partial".to_string())).await.unwrap();
        tx.send(Err("boom".into())).await.unwrap();
        drop(tx);
        let stream: TokenStream = Box::pin(ReceiverStream::new(rx));
        assert!(collect_stream(stream).await.is_err());
    }

    #[test]
    fn new_client_dispatches_every_variant() {
        for (ty, key) in [
            (LlmType::Ollama, None),
            (LlmType::OpenAI, Some("sk-test".to_string())),
            (LlmType::Anthropic, Some("sk-ant".to_string())),
            (LlmType::Gemini, Some("key".to_string())),
        ] {
            let config = LlmConfig {
                llm_type: ty,
                api_key: key,
                model: None,
                base_url: None,
            };
            assert!(new_client(&config).is_ok(), "failed for {:?}", ty);
        }
    }

    #[test]
    fn keyed_providers_require_an_api_key() {
        for ty in [LlmType::OpenAI, LlmType::Anthropic, LlmType::Gemini] {
            let config = LlmConfig {
                llm_type: ty,
                api_key: None,
                model: None,
                base_url: None,
            };
            assert!(new_client(&config).is_err(), "missing key accepted for {:?}", ty);
        }
    }
}
