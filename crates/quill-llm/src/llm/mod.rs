pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod provider;
pub mod router;
pub mod sse;
pub mod types;

pub use anthropic::AnthropicClient;
pub use error::LlmError;
pub use gemini::GeminiClient;
pub use openai::OpenAICompatibleClient;
pub use provider::{collect_stream, ChatProvider, ChunkStream};
pub use router::{Adapter, ProviderType, Router, WireFamily};
pub use sse::cancellable;
pub use types::{ConnectivityReport, Message, ProviderConfig, Role};
