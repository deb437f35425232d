use serde::{Deserialize, Serialize};

use crate::document::ToolCall;

/// Provider-neutral parsed result. Adapters translate their own wire
/// responses into this shape; the core never looks past it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub text: String,
    pub response_id: Option<String>,
    pub custom_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub function_calls: Vec<ToolCall>,
}

impl ParsedResponse {
    pub fn new(text: impl Into<String>) -> Self {
        ParsedResponse {
            text: text.into(),
            response_id: None,
            custom_id: None,
            metadata: serde_json::Value::Null,
            function_calls: Vec::new(),
        }
    }
}

/// A provider failure recorded against a call, kept separate from
/// successful responses so a fresh run retries instead of replaying the
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedError {
    pub message: String,
    pub code: Option<String>,
    pub error_id: Option<String>,
}

/// A row in the pending-batch table: a buffered or submitted call waiting
/// on a provider-side batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub cid: crate::call_id::CallIdentifier,
    pub custom_id: String,
    pub batch_uuid: String,
    pub is_pending: bool,
}

/// Per-agent persisted state: the checkpoint last entered via a
/// successful transition, and the counter value captured at that moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingMetadata {
    pub latest_checkpoint: Option<String>,
    pub checkpoint_counter: u64,
}
