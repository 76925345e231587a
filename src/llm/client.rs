//! LlmClient trait definition

use async_trait::async_trait;
use tokio::sync::mpsc;
#[allow(unused_imports)]
use tracing::debug;

use super::{CompletionRequest, CompletionResponse, LlmError, StreamChunk};

/// Stateless LLM client - each call is independent (fresh context)
///
/// Every completion request carries its own system prompt and messages; no
/// conversation state is held by the client between calls. Callers that need
/// multi-turn memory reconstruct it from `SessionExchange` and pass it back
/// in as messages.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request, blocking until the full response
    /// arrives.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion. Sends chunks to `chunk_tx` as they arrive and
    /// returns the final assembled response.
    async fn stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<CompletionResponse, LlmError>;

    /// List model names currently served by this backend, for the model
    /// catalog refresh. Backends that don't expose a models listing (or
    /// whose listing isn't worth querying every refresh) return an empty
    /// vec; the catalog falls back to its configured priority list.
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }
}

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock LLM client for unit and integration tests.
    ///
    /// Returns canned responses in order and counts calls; also used to
    /// simulate the "echo" failure mode by configuring a response whose
    /// content mirrors the request's last user message.
    pub struct MockLlmClient {
        responses: Mutex<Vec<CompletionResponse>>,
        call_count: AtomicUsize,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self {
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::complete: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().expect("mock responses lock poisoned");
            if responses.is_empty() {
                return Err(LlmError::InvalidResponse("No more mock responses".to_string()));
            }
            Ok(responses.remove(0))
        }

        async fn stream(
            &self,
            request: CompletionRequest,
            _chunk_tx: mpsc::Sender<StreamChunk>,
        ) -> Result<CompletionResponse, LlmError> {
            debug!("MockLlmClient::stream: called");
            self.complete(request).await
        }
    }

}
