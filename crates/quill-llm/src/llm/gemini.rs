use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde_json::{json, Value};

use super::error::{LlmError, Result};
use super::http;
use super::provider::{ChatProvider, ChunkStream};
use super::sse::{open_sse, GeminiDecoder, GeminiResponse};
use super::types::*;

/// Google Gemini API client
///
/// The whole conversation is flattened into a single `contents` turn, one
/// `"<role>: <content>"` part per message. Gemini sees no real multi-turn
/// structure.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: ProviderConfig,
}

impl GeminiClient {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Build the generate or stream URL.
    /// NOTE: Gemini takes the key as a query parameter. Never log this URL.
    fn api_url(&self, stream: bool) -> Result<Url> {
        let action = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let path = format!("/v1beta/models/{}:{}", self.config.model_id, action);
        let mut url = http::endpoint(&self.config.base_url, &path)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &self.config.api_key);
            if stream {
                query.append_pair("alt", "sse");
            }
        }
        Ok(url)
    }

    fn build_request_body(&self, messages: &[Message]) -> Value {
        let parts: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "text": format!("{}: {}", m.role, m.content) }))
            .collect();

        json!({ "contents": [{ "parts": parts }] })
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn build_request(&self, messages: &[Message], stream: bool) -> Result<reqwest::Request> {
        let url = self.api_url(stream)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        http::merge_custom_headers(&mut headers, &self.config.custom_headers);

        self.client
            .post(url)
            .headers(headers)
            .json(&self.build_request_body(messages))
            .build()
            .map_err(|_| LlmError::InvalidUrl)
    }

    async fn complete_buffered(&self, messages: &[Message]) -> Result<String> {
        let request = self.build_request(messages, false)?;
        let response = http::execute(&self.client, request, &self.config.api_key).await?;
        let body: GeminiResponse = http::read_json(response).await?;
        http::require_text(body.first_text())
    }

    fn complete_stream(&self, messages: &[Message]) -> ChunkStream {
        open_sse(
            self.client.clone(),
            self.build_request(messages, true),
            self.config.api_key.clone(),
            GeminiDecoder,
        )
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}
