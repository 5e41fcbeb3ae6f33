use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, TryStreamExt};

use super::error::Result;
use super::types::{Message, ProviderConfig};

/// Live sequence of assistant text fragments. Single pass; dropping it
/// cancels the underlying request.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Chat provider trait - one wire protocol behind a uniform contract
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Build the authenticated HTTP request for a buffered or streaming call
    fn build_request(&self, messages: &[Message], stream: bool) -> Result<reqwest::Request>;

    /// One request, one decoded JSON response
    async fn complete_buffered(&self, messages: &[Message]) -> Result<String>;

    /// Streaming request decoded into text chunks in arrival order
    fn complete_stream(&self, messages: &[Message]) -> ChunkStream;

    /// Resolved configuration this provider was built with
    fn config(&self) -> &ProviderConfig;

    /// Full response text. With `stream` set, the streaming call is drained
    /// and its chunks concatenated.
    async fn complete(&self, messages: &[Message], stream: bool) -> Result<String> {
        if stream {
            collect_stream(self.complete_stream(messages)).await
        } else {
            self.complete_buffered(messages).await
        }
    }
}

/// Drain a chunk stream into one string, failing on the first error item.
pub async fn collect_stream(stream: ChunkStream) -> Result<String> {
    stream
        .try_fold(String::new(), |mut acc, chunk| async move {
            acc.push_str(&chunk);
            Ok(acc)
        })
        .await
}
