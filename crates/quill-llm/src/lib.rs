pub mod config;
pub mod llm;

pub use config::{HttpSettings, ProviderEntry, SceneSelection, Settings};
pub use llm::{
    cancellable, collect_stream, Adapter, AnthropicClient, ChatProvider, ChunkStream,
    ConnectivityReport, GeminiClient, LlmError, Message, OpenAICompatibleClient, ProviderConfig,
    ProviderType, Role, Router,
};

/// Initialize structured JSON logging on stderr
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
