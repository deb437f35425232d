//! The three execution-strategy backends sitting between the agent
//! (`llmgw-agent`) and the datastore/provider adapter:
//! [`sync::SyncBackend`], [`async_backend::AsyncBackend`], and
//! [`batch::BatchBackend`]. Each owns whatever in-memory state its
//! strategy needs and nothing more — the datastore remains the single
//! source of truth shared by all three.

pub mod async_backend;
pub mod batch;
pub mod error;
pub mod sync;

pub use async_backend::AsyncBackend;
pub use batch::{BatchBackend, Cohort};
pub use error::{BackendError, BackendResult};
pub use sync::SyncBackend;
