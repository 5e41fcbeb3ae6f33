use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use futures::{future, stream};
use reqwest::header::HeaderValue;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::anthropic::AnthropicClient;
use super::error::{LlmError, Result};
use super::gemini::GeminiClient;
use super::openai::OpenAICompatibleClient;
use super::provider::{ChatProvider, ChunkStream};
use super::types::{ConnectivityReport, Message, ProviderConfig};
use crate::config::{HttpSettings, ProviderEntry};

/// Attribution headers OpenRouter uses to credit the calling app
pub const OPENROUTER_REFERER: &str = "https://quill-reader.app";
pub const OPENROUTER_TITLE: &str = "Quill";

/// Prompt sent by connectivity probes
const PROBE_PROMPT: &str = "Hi";

/// Declared vendor of a configured provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openRouter")]
    OpenRouter,
    #[serde(rename = "customOpenAI")]
    CustomOpenAI,
    #[serde(rename = "zhipu")]
    Zhipu,
    #[serde(rename = "dashscope")]
    DashScope,
    #[serde(rename = "minimax")]
    Minimax,
}

/// Wire protocol spoken by a provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    OpenAICompatible,
    Anthropic,
    Gemini,
}

impl ProviderType {
    pub const ALL: [ProviderType; 9] = [
        ProviderType::OpenAI,
        ProviderType::Anthropic,
        ProviderType::Google,
        ProviderType::DeepSeek,
        ProviderType::OpenRouter,
        ProviderType::CustomOpenAI,
        ProviderType::Zhipu,
        ProviderType::DashScope,
        ProviderType::Minimax,
    ];

    /// Serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Google => "google",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::OpenRouter => "openRouter",
            ProviderType::CustomOpenAI => "customOpenAI",
            ProviderType::Zhipu => "zhipu",
            ProviderType::DashScope => "dashscope",
            ProviderType::Minimax => "minimax",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "OpenAI",
            ProviderType::Anthropic => "Anthropic",
            ProviderType::Google => "Google Gemini",
            ProviderType::DeepSeek => "DeepSeek",
            ProviderType::OpenRouter => "OpenRouter",
            ProviderType::CustomOpenAI => "Custom (OpenAI-compatible)",
            ProviderType::Zhipu => "Zhipu GLM",
            ProviderType::DashScope => "Alibaba DashScope",
            ProviderType::Minimax => "MiniMax",
        }
    }

    pub fn family(&self) -> WireFamily {
        match self {
            ProviderType::Anthropic => WireFamily::Anthropic,
            ProviderType::Google => WireFamily::Gemini,
            _ => WireFamily::OpenAICompatible,
        }
    }

    /// Endpoint root used when the provider record carries no base URL
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("https://api.openai.com/v1"),
            ProviderType::Anthropic => Some("https://api.anthropic.com/v1"),
            ProviderType::Google => Some("https://generativelanguage.googleapis.com"),
            ProviderType::DeepSeek => Some("https://api.deepseek.com/v1"),
            ProviderType::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ProviderType::CustomOpenAI => None,
            ProviderType::Zhipu => Some("https://open.bigmodel.cn/api/paas/v4"),
            ProviderType::DashScope => Some("https://dashscope.aliyuncs.com/compatible-mode/v1"),
            ProviderType::Minimax => Some("https://api.minimax.chat/v1"),
        }
    }

    /// Headers the router adds for this type unless the caller set them
    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProviderType::OpenRouter => &[
                ("HTTP-Referer", OPENROUTER_REFERER),
                ("X-Title", OPENROUTER_TITLE),
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("gemini") {
            return Ok(ProviderType::Google);
        }
        ProviderType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider type: {}", s))
    }
}

/// Closed set of adapters, one per wire family
#[derive(Debug, Clone)]
pub enum Adapter {
    OpenAI(OpenAICompatibleClient),
    Anthropic(AnthropicClient),
    Gemini(GeminiClient),
}

impl Adapter {
    pub fn new(client: Client, provider_type: ProviderType, config: ProviderConfig) -> Self {
        match provider_type.family() {
            WireFamily::OpenAICompatible => {
                Adapter::OpenAI(OpenAICompatibleClient::new(client, config))
            }
            WireFamily::Anthropic => Adapter::Anthropic(AnthropicClient::new(client, config)),
            WireFamily::Gemini => Adapter::Gemini(GeminiClient::new(client, config)),
        }
    }

    fn inner(&self) -> &dyn ChatProvider {
        match self {
            Adapter::OpenAI(c) => c,
            Adapter::Anthropic(c) => c,
            Adapter::Gemini(c) => c,
        }
    }
}

#[async_trait]
impl ChatProvider for Adapter {
    fn build_request(&self, messages: &[Message], stream: bool) -> Result<reqwest::Request> {
        self.inner().build_request(messages, stream)
    }

    async fn complete_buffered(&self, messages: &[Message]) -> Result<String> {
        self.inner().complete_buffered(messages).await
    }

    fn complete_stream(&self, messages: &[Message]) -> ChunkStream {
        self.inner().complete_stream(messages)
    }

    fn config(&self) -> &ProviderConfig {
        self.inner().config()
    }
}

/// Vendor-agnostic entry point.
///
/// Holds nothing but a cloneable HTTP client handle, so it can be built per
/// call or injected and shared freely.
#[derive(Debug, Clone, Default)]
pub struct Router {
    client: Client,
}

impl Router {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_settings(http: &HttpSettings) -> reqwest::Result<Self> {
        let client = super::http::build_client(http.read_timeout(), http.connect_timeout())?;
        Ok(Self::new(client))
    }

    /// Turn a provider record plus model selection into a request config
    pub fn resolve(provider: &ProviderEntry, model: &str) -> Result<ProviderConfig> {
        // A key that cannot travel in a header is no usable key
        let api_key = provider
            .resolved_api_key()
            .filter(|key| HeaderValue::from_str(key).is_ok())
            .ok_or(LlmError::MissingApiKey)?;
        let base_url = provider.effective_base_url().ok_or(LlmError::InvalidUrl)?;

        let mut headers: HashMap<String, String> = provider.headers.clone();
        for (name, value) in provider.provider_type.default_headers() {
            if !headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        Ok(ProviderConfig::new(provider.display_name(), base_url, &api_key, model)
            .with_provider_id(&provider.id)
            .with_headers(headers))
    }

    /// Adapter for `provider` speaking to `model`
    pub fn adapter(&self, provider: &ProviderEntry, model: &str) -> Result<Adapter> {
        let config = Self::resolve(provider, model)?;
        Ok(Adapter::new(self.client.clone(), provider.provider_type, config))
    }

    /// One-shot completion through whichever adapter `provider` needs
    pub async fn complete(
        &self,
        messages: &[Message],
        provider: &ProviderEntry,
        model: &str,
        stream: bool,
    ) -> Result<String> {
        let span = call_span(provider, model);
        async {
            let started = Instant::now();
            let adapter = self.adapter(provider, model)?;
            match adapter.complete(messages, stream).await {
                Ok(text) => {
                    tracing::info!(
                        stream,
                        elapsed_ms = elapsed_ms(started),
                        chars = text.chars().count(),
                        "LLM call completed"
                    );
                    Ok(text)
                }
                Err(e) => {
                    tracing::warn!(stream, error = %e, "LLM call failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Live chunk stream through whichever adapter `provider` needs
    pub fn stream(
        &self,
        messages: &[Message],
        provider: &ProviderEntry,
        model: &str,
    ) -> ChunkStream {
        let _guard = call_span(provider, model).entered();
        match self.adapter(provider, model) {
            Ok(adapter) => {
                tracing::debug!("Opening LLM stream");
                adapter.complete_stream(messages)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM stream could not be opened");
                Box::pin(stream::once(future::ready(Err(e))))
            }
        }
    }

    /// Send a minimal prompt and time it. Never fails; errors are reported
    /// in the result with the latency measured up to the failure.
    pub async fn test_connectivity(
        &self,
        provider: &ProviderEntry,
        model: &str,
    ) -> ConnectivityReport {
        let span = call_span(provider, model);
        async {
            let started = Instant::now();
            let outcome = match self.adapter(provider, model) {
                Ok(adapter) => adapter.complete(&[Message::user(PROBE_PROMPT)], false).await,
                Err(e) => Err(e),
            };
            let latency_ms = elapsed_ms(started);

            match outcome {
                Ok(_) => {
                    tracing::info!(latency_ms, "Connectivity test succeeded");
                    ConnectivityReport {
                        success: true,
                        latency_ms,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(latency_ms, error = %e, "Connectivity test failed");
                    ConnectivityReport {
                        success: false,
                        latency_ms,
                        error: Some(e.to_string()),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn call_span(provider: &ProviderEntry, model: &str) -> tracing::Span {
    tracing::info_span!(
        "llm_call",
        request_id = %Uuid::new_v4(),
        provider = %provider.id,
        provider_type = %provider.provider_type,
        model = %model,
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(provider_type: ProviderType) -> ProviderEntry {
        ProviderEntry::new("p1", provider_type).with_api_key("sk-test")
    }

    #[test]
    fn test_provider_type_names_round_trip() {
        for t in ProviderType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            let back: ProviderType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, t);
            assert_eq!(t.as_str().parse::<ProviderType>().unwrap(), t);
        }
    }

    #[test]
    fn test_provider_type_parse_case_insensitive() {
        assert_eq!("OpenRouter".parse::<ProviderType>().unwrap(), ProviderType::OpenRouter);
        assert_eq!("CUSTOMOPENAI".parse::<ProviderType>().unwrap(), ProviderType::CustomOpenAI);
        assert_eq!("gemini".parse::<ProviderType>().unwrap(), ProviderType::Google);
        assert!("bedrock".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_family_selection() {
        assert_eq!(ProviderType::Anthropic.family(), WireFamily::Anthropic);
        assert_eq!(ProviderType::Google.family(), WireFamily::Gemini);
        for t in [
            ProviderType::OpenAI,
            ProviderType::DeepSeek,
            ProviderType::OpenRouter,
            ProviderType::CustomOpenAI,
            ProviderType::Zhipu,
            ProviderType::DashScope,
            ProviderType::Minimax,
        ] {
            assert_eq!(t.family(), WireFamily::OpenAICompatible);
        }
    }

    #[test]
    fn test_adapter_variant_by_type() {
        let router = Router::default();
        let adapter = |t| router.adapter(&entry(t), "m");
        assert!(matches!(adapter(ProviderType::Anthropic), Ok(Adapter::Anthropic(_))));
        assert!(matches!(adapter(ProviderType::Google), Ok(Adapter::Gemini(_))));
        assert!(matches!(adapter(ProviderType::Zhipu), Ok(Adapter::OpenAI(_))));
    }

    #[test]
    fn test_resolve_uses_default_base_url() {
        let config = Router::resolve(&entry(ProviderType::DeepSeek), "deepseek-chat").unwrap();
        assert_eq!(config.base_url, "https://api.deepseek.com/v1");
        assert_eq!(config.model_id, "deepseek-chat");
        assert_eq!(config.provider_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_resolve_custom_without_url_is_invalid() {
        let err = Router::resolve(&entry(ProviderType::CustomOpenAI), "m").unwrap_err();
        assert_eq!(err, LlmError::InvalidUrl);
    }

    #[test]
    fn test_resolve_missing_key() {
        let provider = ProviderEntry::new("p1", ProviderType::OpenAI);
        assert_eq!(Router::resolve(&provider, "gpt-4o").unwrap_err(), LlmError::MissingApiKey);
    }

    #[test]
    fn test_resolve_rejects_key_unfit_for_header() {
        let provider = ProviderEntry::new("p1", ProviderType::Anthropic).with_api_key("sk-ant\nx");
        assert_eq!(Router::resolve(&provider, "claude").unwrap_err(), LlmError::MissingApiKey);
    }

    #[test]
    fn test_openrouter_injects_default_headers() {
        let router = Router::default();
        let adapter = router.adapter(&entry(ProviderType::OpenRouter), "openai/gpt-4o").unwrap();
        let request = adapter.build_request(&[Message::user("Hi")], false).unwrap();

        assert_eq!(request.headers()["http-referer"], OPENROUTER_REFERER);
        assert_eq!(request.headers()["x-title"], OPENROUTER_TITLE);
        assert_eq!(request.url().as_str(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn test_openrouter_preserves_caller_headers() {
        let provider = entry(ProviderType::OpenRouter)
            .with_header("http-referer", "https://mine.example")
            .with_header("X-Title", "My Reader");
        let request = Router::default()
            .adapter(&provider, "openai/gpt-4o")
            .unwrap()
            .build_request(&[], false)
            .unwrap();

        assert_eq!(request.headers()["http-referer"], "https://mine.example");
        assert_eq!(request.headers()["x-title"], "My Reader");
        assert_eq!(request.headers().get_all("x-title").iter().count(), 1);
    }

    #[test]
    fn test_other_types_get_no_attribution_headers() {
        let request = Router::default()
            .adapter(&entry(ProviderType::OpenAI), "gpt-4o")
            .unwrap()
            .build_request(&[], false)
            .unwrap();
        assert!(request.headers().get("x-title").is_none());
        assert!(request.headers().get("http-referer").is_none());
    }

    #[tokio::test]
    async fn test_connectivity_missing_key_never_throws() {
        let provider = ProviderEntry::new("p1", ProviderType::Anthropic);
        let report = Router::default().test_connectivity(&provider, "claude").await;

        assert!(!report.success);
        assert!(report.error.as_deref().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn test_stream_surfaces_resolution_error() {
        use futures::StreamExt;
        let provider = ProviderEntry::new("p1", ProviderType::OpenAI);
        let items: Vec<_> = Router::default()
            .stream(&[Message::user("Hi")], &provider, "m")
            .collect()
            .await;
        assert_eq!(items, vec![Err(LlmError::MissingApiKey)]);
    }
}
