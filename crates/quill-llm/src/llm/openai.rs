use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{LlmError, Result};
use super::http;
use super::provider::{ChatProvider, ChunkStream};
use super::sse::{open_sse, OpenAIDecoder};
use super::types::*;

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Client for any `/chat/completions` endpoint: OpenAI, DeepSeek, Zhipu,
/// DashScope, Minimax, OpenRouter and custom deployments
#[derive(Debug, Clone)]
pub struct OpenAICompatibleClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAICompatibleClient {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn build_request_body(&self, messages: &[Message], stream: bool) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        json!({
            "model": self.config.model_id,
            "messages": api_messages,
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAICompatibleClient {
    fn build_request(&self, messages: &[Message], stream: bool) -> Result<reqwest::Request> {
        let url = http::endpoint(&self.config.base_url, CHAT_COMPLETIONS_PATH)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        http::insert_secret(
            &mut headers,
            AUTHORIZATION,
            &format!("Bearer {}", self.config.api_key),
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

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content);
        http::require_text(content)
    }

    fn complete_stream(&self, messages: &[Message]) -> ChunkStream {
        open_sse(
            self.client.clone(),
            self.build_request(messages, true),
            self.config.api_key.clone(),
            OpenAIDecoder,
        )
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Chat Completions response structures
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: Option<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(base_url: &str) -> OpenAICompatibleClient {
        OpenAICompatibleClient::new(
            Client::new(),
            ProviderConfig::new("OpenAI", base_url, "sk-test", "gpt-4o-mini"),
        )
    }

    fn body_json(request: &reqwest::Request) -> Value {
        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_build_request_headers_and_method() {
        let client = client_for("https://api.openai.com/v1");
        let request = client.build_request(&[Message::user("Hello")], false).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_build_request_body() {
        let client = client_for("https://api.openai.com/v1");
        let messages = vec![Message::system("Be brief"), Message::user("Hello")];
        let body = body_json(&client.build_request(&messages, true).unwrap());

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
    }

    #[test]
    fn test_trailing_slash_normalized() {
        let a = client_for("https://api.deepseek.com/v1").build_request(&[], false).unwrap();
        let b = client_for("https://api.deepseek.com/v1/").build_request(&[], false).unwrap();
        assert_eq!(a.url(), b.url());
    }

    #[test]
    fn test_empty_messages_tolerated() {
        let request = client_for("https://api.openai.com/v1").build_request(&[], false).unwrap();
        let body = body_json(&request);
        assert_eq!(body["messages"], json!([]));
    }

    #[test]
    fn test_malformed_base_url() {
        let err = client_for("https://api open.com/v1").build_request(&[], false).unwrap_err();
        assert_eq!(err, LlmError::InvalidUrl);
    }

    #[test]
    fn test_custom_headers_merged_without_overwrite() {
        let config = ProviderConfig::new("Custom", "https://llm.internal/v1", "sk-test", "m")
            .with_header("Authorization", "Bearer hijack")
            .with_header("content-type", "text/plain")
            .with_header("X-Team", "papers");
        let client = OpenAICompatibleClient::new(Client::new(), config);
        let request = client.build_request(&[], false).unwrap();

        assert_eq!(request.headers()[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(request.headers()["x-team"], "papers");
    }

    #[test]
    fn test_unencodable_key_is_left_to_the_vendor() {
        let config = ProviderConfig::new("OpenAI", "https://api.openai.com/v1", "sk\nbroken", "m");
        let request = OpenAICompatibleClient::new(Client::new(), config)
            .build_request(&[], false)
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }
}
