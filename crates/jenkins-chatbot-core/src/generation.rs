//! Text-generation capability consumed by every model-driven stage.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

/// Returned by generators in place of output when generation fails.
pub const GENERATION_APOLOGY: &str = "Sorry, something went wrong during generation.";

/// Incremental text fragments of one generation.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Prompt → text with a token budget.
///
/// Implementations must not surface transient failures as errors: they log
/// and return [`GENERATION_APOLOGY`] instead. Callers therefore treat every
/// returned string as untrusted model output and parse it with total
/// functions.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a complete response.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> String;

    /// Generate a response as a stream of fragments.
    ///
    /// The default implementation yields the whole [`generate`](Generator::generate)
    /// output as a single fragment.
    async fn generate_stream(&self, prompt: &str, max_tokens: u32) -> TextStream {
        let text = self.generate(prompt, max_tokens).await;
        Box::pin(futures::stream::once(async move { text }))
    }
}
