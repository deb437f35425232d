//! Shared data model for the deterministic-replay LLM gateway: the
//! document/message content model, LLM identity resolution, the call
//! identifier, and the provider-neutral response/error/batch records.
//!
//! Nothing in this crate talks to a provider, a datastore, or the
//! filesystem — it is pure data plus the small amount of logic
//! (provider-prefix inference, custom-id formatting, CID matching) that
//! every other crate in the workspace needs to agree on.

pub mod call_id;
pub mod document;
pub mod error;
pub mod identity;
pub mod response;
pub mod signal;

pub use call_id::{CallIdentifier, CidMeta};
pub use document::{Document, Role, ToolArguments, ToolCall};
pub use error::{Result, TypesError};
pub use identity::{guess_provider, LlmIdentity, Provider};
pub use response::{BatchRecord, ParsedError, ParsedResponse, WorkingMetadata};
pub use signal::{ControlSignal, Outcome};

/// Free-text system prompt. A plain alias rather than a newtype: every
/// call site already treats `None` as "no instructions" and nothing else
/// distinguishes it from any other optional string.
pub type Instructions = Option<String>;
