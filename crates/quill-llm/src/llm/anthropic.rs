use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{LlmError, Result};
use super::http;
use super::provider::{ChatProvider, ChunkStream};
use super::sse::{open_sse, AnthropicDecoder};
use super::types::*;

const MESSAGES_PATH: &str = "/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Messages API client
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    config: ProviderConfig,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self {
            client,
            config,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Build Anthropic API request body from messages
    fn build_request_body(&self, messages: &[Message], stream: bool) -> Value {
        let mut body = json!({
            "model": self.config.model_id,
            "max_tokens": self.max_tokens,
            "stream": stream,
        });

        // System turns go in the top-level field; the API rejects them in `messages`
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        let api_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        body["messages"] = json!(api_messages);

        body
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    fn build_request(&self, messages: &[Message], stream: bool) -> Result<reqwest::Request> {
        let url = http::endpoint(&self.config.base_url, MESSAGES_PATH)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        http::insert_secret(
            &mut headers,
            HeaderName::from_static("x-api-key"),
            &self.config.api_key,
        );
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        http::merge_custom_headers(&mut headers, &self.config.custom_headers);

        self.client
            .post(url)
            .headers(headers)
            .json(&self.build_request_body(messages, stream))
            .build()
            .map_err(|_| LlmError::InvalidUrl)
    }

    async fn complete_buffered(&self, messages: &[Message]) -> Result<String> {
        let request = self.build_request(messages, false)?;
        let response = http::execute(&self.client, request, &self.config.api_key).await?;
        let body: ApiResponse = http::read_json(response).await?;

        let text = body
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text);
        http::require_text(text)
    }

    fn complete_stream(&self, messages: &[Message]) -> ChunkStream {
        open_sse(
            self.client.clone(),
            self.build_request(messages, true),
            self.config.api_key.clone(),
            AnthropicDecoder::default(),
        )
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Anthropic API response structures
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}
