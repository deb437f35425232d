//! The narrow contract the gateway core consumes from each upstream
//! provider.
//!
//! Three sub-interfaces — [`SyncProviderAdapter`], [`AsyncProviderAdapter`],
//! [`BatchProviderAdapter`] — each of which a concrete provider picks
//! only the ones it actually supports, plus the [`ProviderAdapter`]
//! supertrait every one of them shares (`parse_response`,
//! `default_identity`, `provider_type`). The core never interprets a raw
//! provider response beyond what [`ParsedResponse`] exposes.
//!
//! Real network-calling adapters (OpenAI, Anthropic, Google wire
//! encoding) are out of scope here; this crate ships [`mock::MockAdapter`]
//! as a deterministic stand-in for tests and examples.

pub mod error;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{ProviderError, ProviderResult};
use llmgw_types::{Document, Instructions, LlmIdentity, ParsedResponse};

/// The subset of an `askLLM` call an adapter needs to do its work. The
/// core assembles this once per request and never inspects
/// provider-specific fields beyond what lands back in [`ParsedResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonQueryParameters {
    pub instructions: Instructions,
    pub documents: Vec<Document>,
    pub llm: LlmIdentity,
    pub text_format: Option<serde_json::Value>,
    pub tools: Option<serde_json::Value>,
}

/// Opaque wire response. The core only ever calls
/// [`ProviderAdapter::parse_response`] on it.
pub type RawResponse = serde_json::Value;

/// One provider-batch-job outcome, keyed back to a call via `custom_id`
/// inside each parsed response's [`ParsedResponse::custom_id`].
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub raw_output: String,
    pub parsed_responses: Option<Vec<ParsedResponse>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Ready,
    Error,
}

/// Shared by every adapter regardless of which execution strategies it
/// supports.
pub trait ProviderAdapter: Send + Sync {
    fn provider_type(&self) -> &str;
    fn default_identity(&self) -> LlmIdentity;
    fn parse_response(&self, raw: &RawResponse) -> ProviderResult<ParsedResponse>;
}

/// Runs on the caller's thread.
pub trait SyncProviderAdapter: ProviderAdapter {
    fn prepare_sync_call(&self, params: &CommonQueryParameters) -> ProviderResult<RawResponse>;
}

/// Must be cancellable — the async backend drops the future outright on
/// `shutdown()`.
#[async_trait]
pub trait AsyncProviderAdapter: ProviderAdapter {
    async fn prepare_async_call(&self, params: CommonQueryParameters) -> ProviderResult<RawResponse>;
}

/// `prepare_batch_call` never touches the network; `submit_batch` and
/// `download_batch` do.
pub trait BatchProviderAdapter: ProviderAdapter {
    fn prepare_batch_call(
        &self,
        params: &CommonQueryParameters,
        custom_id: &str,
    ) -> ProviderResult<String>;

    fn submit_batch(&self, lines: &[String], model: &str) -> ProviderResult<String>;

    fn download_batch(&self, batch_uuid: &str) -> ProviderResult<Vec<BatchResult>>;
}
