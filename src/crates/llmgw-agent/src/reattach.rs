//! [`DatastoreBackendHandle`]: the [`llmgw_response::BackendHandle`] used
//! to re-bind a [`llmgw_response::ResponseHandle`] after its
//! [`llmgw_response::HandleSnapshot`] is loaded back from a
//! [`crate::scope::AgentScope`]-persisted message state.
//!
//! Any backend can resolve an already-completed call straight from the
//! datastore — the async worker's in-flight bookkeeping only matters
//! while the process that submitted the call is still running, so a
//! reattached handle always goes through here rather than back through
//! `llmgw-backend`.

use std::sync::Arc;

use async_trait::async_trait;
use llmgw_store::Datastore;
use llmgw_types::{CallIdentifier, ParsedResponse};

pub struct DatastoreBackendHandle {
    ds: Arc<dyn Datastore>,
}

impl DatastoreBackendHandle {
    pub fn new(ds: Arc<dyn Datastore>) -> Arc<Self> {
        Arc::new(DatastoreBackendHandle { ds })
    }
}

#[async_trait]
impl llmgw_response::BackendHandle for DatastoreBackendHandle {
    async fn resolve(&self, cid: &CallIdentifier) -> llmgw_response::Result<ParsedResponse> {
        self.ds
            .retrieve(cid, false)
            .await
            .map_err(|err| llmgw_response::ResponseError::Backend(err.to_string()))?
            .ok_or_else(|| llmgw_response::ResponseError::Integrity(format!("{cid:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_response::ResponseHandle;
    use llmgw_store::{ColdTierPaths, SqliteDatastore};

    #[tokio::test]
    async fn reattached_handle_resolves_from_the_datastore() {
        let dir = tempfile::tempdir().unwrap();
        let ds: Arc<dyn Datastore> = Arc::new(
            SqliteDatastore::open_in_memory(ColdTierPaths::new(dir.path().join("store")))
                .await
                .unwrap(),
        );
        let cid = CallIdentifier::new("agent", "hash", 0, 1);
        ds.store(&cid, &ParsedResponse::new("persisted answer"), false)
            .await
            .unwrap();

        let handle = ResponseHandle::from_snapshot(
            llmgw_response::HandleSnapshot { cid },
            DatastoreBackendHandle::new(ds),
        );
        assert_eq!(handle.resolve().await.unwrap(), "persisted answer");
    }
}
