//! Deterministic-replay LLM gateway: facade, configuration, and the
//! `Gateway` factory tying every other crate in this workspace together.
//!
//! Application code depends on this crate alone: `llmgw::GatewayConfig`
//! to describe how to open a working directory, `llmgw::Gateway::open`
//! to do it, and then `Gateway::agent`/`llmgw_message::MessageState` for
//! everything downstream. The lower crates (`llmgw-types` through
//! `llmgw-agent`) stay independently usable for anyone who wants to swap
//! one piece out, but this is the door most callers walk through.

pub mod config;
pub mod error;
pub mod gateway;

pub use config::{GatewayConfig, Strategy, ThrottlerConfig, Tweaks};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{AdapterHandle, Gateway};

// Re-exports so a caller building against this facade does not need to
// add every workspace member as its own direct dependency.
pub use llmgw_agent::{Agent, AgentScope};
pub use llmgw_message::{AskOptions, Askable, MessageState};
pub use llmgw_provider::{
    AsyncProviderAdapter, BatchProviderAdapter, BatchResult, BatchStatus, CommonQueryParameters,
    ProviderAdapter, SyncProviderAdapter,
};
pub use llmgw_response::ResponseHandle;
pub use llmgw_types::{
    CallIdentifier, ControlSignal, Document, LlmIdentity, ParsedResponse, Provider, Role,
};
