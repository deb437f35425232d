//! Persistent content-addressed cache: a hot relational tier (SQLite via
//! `sqlx`) plus cold-tier columnar archival (Parquet) for metadata rows
//! the datastore no longer needs query-speed access to.
//!
//! [`Datastore`] is the contract every backend (`llmgw-backend`) and the
//! agent (`llmgw-agent`) consume; [`SqliteDatastore`] is the only
//! implementation shipped here, covering the schema, retrieval/insert
//! rules, and cold-tier flush algorithm described in `coldtier` and
//! `sqlite`.

pub mod coldtier;
pub mod error;
pub mod sqlite;

pub use coldtier::ColdTierPaths;
pub use error::{Result, StoreError};
pub use sqlite::SqliteDatastore;

use async_trait::async_trait;
use llmgw_types::{BatchRecord, CallIdentifier, ParsedError, ParsedResponse};

/// Single-writer, many-reader persistent cache of provider responses,
/// metadata, and pending-batch bookkeeping.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Oldest-first lookup on `(agent_name, doc_hash, seq_id)`, falling
    /// back to `(agent_name, doc_hash)` alone when the exact triple
    /// matches nothing (P7: a duplicate stored under the wrong `seq_id`
    /// by an earlier buggy run must still be replayable).
    async fn retrieve(
        &self,
        cid: &CallIdentifier,
        with_metadata: bool,
    ) -> Result<Option<ParsedResponse>>;

    /// Appends a new row by default; `upsert=true` replaces the
    /// smallest-id row matching `(doc_hash, agent_name)` in place.
    async fn store(&self, cid: &CallIdentifier, parsed: &ParsedResponse, upsert: bool) -> Result<()>;

    /// Records a provider failure separately from successful responses
    /// so a fresh run retries rather than replaying the failure.
    async fn store_error(&self, cid: &CallIdentifier, err: &ParsedError) -> Result<()>;

    /// Buffers `entries` (one `(cid, custom_id)` pair per call in this
    /// chunk) as pending rows under `batch_uuid`.
    async fn store_pending_batch(
        &self,
        batch_uuid: &str,
        entries: &[(CallIdentifier, String)],
    ) -> Result<()>;

    /// Joins each response's `custom_id` back to its pending row under
    /// `batch_uuid` and stores it. Does *not* clear the pending rows —
    /// callers pair this with [`Datastore::clear_batch_pending`].
    /// Returns the CIDs that were successfully resolved and stored.
    async fn store_ready_batch(
        &self,
        batch_uuid: &str,
        responses: &[ParsedResponse],
        upsert: bool,
    ) -> Result<Vec<CallIdentifier>>;

    /// All pending-batch rows (resolved or not) filed under `batch_uuid`.
    async fn retrieve_batch_cids(&self, batch_uuid: &str) -> Result<Vec<BatchRecord>>;

    async fn list_pending_batch_uuids(&self) -> Result<Vec<String>>;

    async fn clear_batch_pending(&self, batch_uuid: &str) -> Result<()>;

    /// True iff `cid` currently has a live (`is_pending=1`) row in any
    /// batch. I2: this must hold for at most one live UUID at a time.
    async fn call_in_pending_batch(&self, cid: &CallIdentifier) -> Result<bool>;

    /// Flushes pending writes and archives eligible hot-tier rows
    /// (`provider_type ∈ {openai, google}`) to the cold tier.
    async fn persist(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
