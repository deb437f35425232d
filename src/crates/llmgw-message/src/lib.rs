//! The ordered conversation container.
//!
//! A [`MessageState`] holds `Document`s and previously-returned
//! [`ResponseHandle`]s in append order and is itself askable:
//! [`MessageState::ask_llm`] appends the caller's new documents, calls
//! the bound agent's `askLLM` with the *whole* list cast to documents as
//! input, and appends the resulting handle.
//!
//! [`Askable`] is the narrow interface `MessageState` needs from
//! whatever agent it is bound to. It lives here — not in `llmgw-agent`
//! — so that `MessageState` never depends on the agent crate; the agent
//! crate depends on this one and implements the trait, breaking the
//! `MessageState` → `Agent` → `Backend` reference cycle at the type
//! level, not just at the value level.

pub mod state;

use async_trait::async_trait;
use thiserror::Error;

pub use llmgw_response::ResponseHandle;
use llmgw_types::{ControlSignal, Document, Instructions, LlmIdentity};

pub use state::{MessageItem, MessageSnapshot, MessageState, SnapshotItem};

/// Mirrors `askLLM`'s keyword arguments.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub instructions: Instructions,
    pub llm: Option<LlmIdentity>,
    pub salt: Vec<String>,
    pub hash_by: Vec<String>,
    pub text_format: Option<serde_json::Value>,
    pub tools: Option<serde_json::Value>,
    pub tag: Option<String>,
    pub save_input: bool,
}

/// What the bound agent reports back about the call it just made, so
/// `MessageState` can keep its own recovery-only counters in sync
/// without reaching into the agent's internal state.
#[derive(Debug, Clone, Copy)]
pub struct AskOutcomeMeta {
    pub seq_id: u64,
    pub used_checkpoint: bool,
}

pub type AskOutcome<T> = std::result::Result<T, AskOutcomeError>;

/// Anything `Askable::ask_llm` can return besides success: a control
/// signal (batch deferral, checkpoint skip) or an opaque true error —
/// the concrete error type lives in `llmgw-agent` and is boxed at this
/// trait boundary so this crate does not need to depend on it.
#[derive(Debug, Error)]
pub enum AskOutcomeError {
    #[error("control signal: {0:?}")]
    Signal(ControlSignal),
    #[error(transparent)]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<ControlSignal> for AskOutcomeError {
    fn from(signal: ControlSignal) -> Self {
        AskOutcomeError::Signal(signal)
    }
}

/// The subset of the agent `MessageState` needs: ask it for a response
/// given the accumulated document list.
#[async_trait]
pub trait Askable: Send + Sync {
    async fn ask_llm(
        &self,
        docs: Vec<Document>,
        opts: AskOptions,
    ) -> AskOutcome<(ResponseHandle, AskOutcomeMeta)>;
}
