//! [`SyncBackend`]: throttle, call the provider on the caller's own task,
//! store, and hand back an already-[`ResponseHandle::Ready`] handle.

use std::sync::Arc;

use llmgw_provider::{CommonQueryParameters, SyncProviderAdapter};
use llmgw_response::ResponseHandle;
use llmgw_store::Datastore;
use llmgw_throttle::Throttler;
use llmgw_types::CallIdentifier;

use crate::error::BackendResult;

pub struct SyncBackend {
    ds: Arc<dyn Datastore>,
    throttler: Arc<Throttler>,
    rewrite_cache: bool,
}

impl SyncBackend {
    pub fn new(ds: Arc<dyn Datastore>, throttler: Arc<Throttler>, rewrite_cache: bool) -> Self {
        SyncBackend {
            ds,
            throttler,
            rewrite_cache,
        }
    }

    /// Throttles, calls the provider, stores the result, and returns a
    /// `Ready` handle. There is no control-signal path here — a sync
    /// call either succeeds or raises a true [`crate::BackendError`].
    pub async fn submit_query(
        &self,
        adapter: &dyn SyncProviderAdapter,
        params: &CommonQueryParameters,
        cid: &CallIdentifier,
    ) -> BackendResult<ResponseHandle> {
        let delay = self.throttler.calculate_delay();
        if !delay.is_zero() {
            tracing::debug!(agent = %cid.agent_name, delay_ms = delay.as_millis(), "throttled sync call");
            tokio::time::sleep(delay).await;
            self.throttler.record_request(None);
        }

        let raw = adapter.prepare_sync_call(params)?;
        let parsed = adapter.parse_response(&raw)?;
        self.ds.store(cid, &parsed, self.rewrite_cache).await?;
        tracing::debug!(agent = %cid.agent_name, seq_id = cid.seq_id, "sync call stored");

        Ok(ResponseHandle::ready_with_cid(parsed, cid.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_provider::mock::MockAdapter;
    use llmgw_store::{ColdTierPaths, SqliteDatastore};
    use llmgw_types::LlmIdentity;

    async fn in_memory_store() -> Arc<dyn Datastore> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(
            SqliteDatastore::open_in_memory(ColdTierPaths::new(dir.into_path()))
                .await
                .unwrap(),
        )
    }

    fn params() -> CommonQueryParameters {
        CommonQueryParameters {
            instructions: None,
            documents: vec![],
            llm: LlmIdentity::resolve("gpt-4o", None),
            text_format: None,
            tools: None,
        }
    }

    #[tokio::test]
    async fn submits_and_stores_a_response() {
        let ds = in_memory_store().await;
        let throttler = Arc::new(Throttler::disabled());
        let backend = SyncBackend::new(ds.clone(), throttler, false);

        let adapter = MockAdapter::new();
        adapter.stub("", "hi there");
        let cid = CallIdentifier::new("agent", "h", 0, 1);

        let handle = backend.submit_query(&adapter, &params(), &cid).await.unwrap();
        assert!(handle.is_ready());
        assert_eq!(handle.resolve().await.unwrap(), "hi there");

        let stored = ds.retrieve(&cid, false).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn throttle_delays_before_the_second_call() {
        let ds = in_memory_store().await;
        let throttler = Arc::new(Throttler::new(Some(1), 0.05));
        let backend = SyncBackend::new(ds, throttler, false);
        let adapter = MockAdapter::new();
        adapter.stub("", "one");

        let start = std::time::Instant::now();
        backend
            .submit_query(&adapter, &params(), &CallIdentifier::new("agent", "h1", 0, 1))
            .await
            .unwrap();
        backend
            .submit_query(&adapter, &params(), &CallIdentifier::new("agent", "h2", 1, 1))
            .await
            .unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(40));
    }
}
