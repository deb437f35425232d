//! The per-agent checkpoint/counter state machine and cache-first
//! dispatch sitting at the center of the gateway.
//!
//! [`Agent`] implements [`llmgw_message::Askable`] directly, so a
//! [`llmgw_message::MessageState`] can bind to one without this crate
//! needing to depend back on `llmgw-message` for anything but that
//! trait. [`AgentScope`] is the scoped-acquisition guard that clears
//! transient checkpoint state and persists bound message state no matter
//! how the guarded block ends. [`AgentOrchestrator`] hands out one
//! cached `Agent` per name.

pub mod agent;
pub mod error;
pub mod reattach;
pub mod scope;
pub mod state;
pub mod strategy;

pub mod orchestrator;

pub use agent::{Agent, GatewayShared};
pub use error::{AgentError, AgentResult};
pub use orchestrator::AgentOrchestrator;
pub use reattach::DatastoreBackendHandle;
pub use scope::{AgentScope, ScopeError, ScopeResult};
pub use state::TransientState;
pub use strategy::{ProviderInfo, Strategy};
