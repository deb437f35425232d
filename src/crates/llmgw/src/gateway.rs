//! [`Gateway`]: the factory and facade the rest of this workspace builds
//! toward. A plain constructor rather than a singleton, built in a
//! builder-method config style.
//!
//! Provider adapters are an external collaborator: `Gateway::open` takes
//! one in as an [`AdapterHandle`] rather than constructing it, and fails
//! fast if the handle's variant does not match the configured [`Strategy`].

use std::sync::Arc;

use llmgw_agent::{Agent, AgentOrchestrator, AgentScope};
use llmgw_backend::{AsyncBackend, BatchBackend, Cohort, SyncBackend};
use llmgw_files::FileManager;
use llmgw_provider::{AsyncProviderAdapter, BatchProviderAdapter, SyncProviderAdapter};
use llmgw_store::{ColdTierPaths, Datastore, SqliteDatastore};
use llmgw_throttle::Throttler;

use crate::config::{GatewayConfig, Strategy as ConfigStrategy};
use crate::error::{GatewayError, GatewayResult};

/// The provider adapter a caller hands to [`Gateway::open`], tagged with
/// which of the three sub-interfaces it was built to
/// drive. Exactly one variant is usable for any given [`ConfigStrategy`].
pub enum AdapterHandle {
    Sync(Arc<dyn SyncProviderAdapter>),
    Async(Arc<dyn AsyncProviderAdapter>),
    Batch(Arc<dyn BatchProviderAdapter>),
}

/// One opened gateway: the working directory, the hot/cold datastore,
/// the chosen execution strategy, and the per-agent orchestrator sitting
/// on top of all three.
pub struct Gateway {
    orchestrator: AgentOrchestrator,
    ds: Arc<dyn Datastore>,
}

impl Gateway {
    /// Opens (or resumes) the working directory named by `config.directory`,
    /// wiring together the file manager, datastore, throttler, and chosen
    /// backend, and returns a gateway ready to hand out agents.
    pub async fn open(config: GatewayConfig, adapter: AdapterHandle) -> GatewayResult<Self> {
        let mut files = FileManager::open(&config.directory)?;
        let db_path = files.allocate_datastore_path()?;
        let cold = ColdTierPaths::new(files.allocate_apimeta_dir()?);
        let ds: Arc<dyn Datastore> = Arc::new(SqliteDatastore::open(db_path, cold).await?);
        let session_id = files.session_id();

        let strategy = match (config.strategy, adapter) {
            (ConfigStrategy::Sync, AdapterHandle::Sync(adapter)) => {
                let throttler = Arc::new(Throttler::new(
                    config.throttler.max_requests,
                    config.throttler.window_seconds,
                ));
                let backend = SyncBackend::new(ds.clone(), throttler, config.rewrite_cache);
                llmgw_agent::Strategy::sync(backend, adapter)
            }
            (ConfigStrategy::Async, AdapterHandle::Async(adapter)) => {
                let backend = AsyncBackend::new(
                    ds.clone(),
                    config.rewrite_cache,
                    config.tweaks.async_max_concurrent,
                );
                llmgw_agent::Strategy::async_(backend, adapter)
            }
            (ConfigStrategy::Batch, AdapterHandle::Batch(adapter)) => {
                let backend = BatchBackend::new(ds.clone(), config.rewrite_cache);
                llmgw_agent::Strategy::batch(backend, adapter)
            }
            (ConfigStrategy::Sync, _) => {
                return Err(GatewayError::AdapterStrategyMismatch { strategy: "sync" })
            }
            (ConfigStrategy::Async, _) => {
                return Err(GatewayError::AdapterStrategyMismatch { strategy: "async" })
            }
            (ConfigStrategy::Batch, _) => {
                return Err(GatewayError::AdapterStrategyMismatch { strategy: "batch" })
            }
        };

        let shared = Arc::new(llmgw_agent::GatewayShared {
            ds: ds.clone(),
            files: parking_lot::Mutex::new(files),
            strategy,
            session_id,
            ignore_cache: config.ignore_cache,
            rewrite_cache: config.rewrite_cache,
        });

        Ok(Gateway {
            orchestrator: AgentOrchestrator::new(shared),
            ds,
        })
    }

    /// Returns the agent for `name`, creating and caching it on first use.
    pub fn agent(&self, name: &str) -> Arc<Agent> {
        self.orchestrator.agent(name)
    }

    /// Opens a scoped acquisition over `agent`. Pass `swallow_not_available = true` only under the
    /// batch strategy, where an unresolved deferred value is expected.
    pub fn agent_scope<'a>(&self, agent: &'a Agent, swallow_not_available: bool) -> AgentScope<'a> {
        AgentScope::new(agent, swallow_not_available)
    }

    /// Flushes pending writes and runs the cold-tier archival pass
    ///`), then flushes file-manager metadata.
    pub async fn persist(&self) -> GatewayResult<()> {
        self.ds.persist().await?;
        self.orchestrator.persist()?;
        Ok(())
    }

    /// Submits every buffered batch call as provider-side batch jobs
    ///. Only meaningful under the batch strategy;
    /// calling it under another strategy is a programmer error the type
    /// system does not prevent, since the backend lives behind the
    /// `Strategy` enum rather than being exposed directly.
    pub async fn execute_batch(
        &self,
        max_batch_size: usize,
        confirm: Option<&(dyn Fn(usize, usize) -> bool + Send + Sync)>,
    ) -> GatewayResult<Cohort> {
        match &self.orchestrator.shared().strategy {
            llmgw_agent::Strategy::Batch { backend, adapter, .. } => {
                Ok(backend.execute_batch(adapter.as_ref(), max_batch_size, confirm).await?)
            }
            _ => Err(GatewayError::AdapterStrategyMismatch { strategy: "batch" }),
        }
    }

    /// Polls every pending batch UUID and resolves whichever jobs are
    /// ready, archiving each one's raw output. Returns the UUIDs that finished this call.
    pub async fn try_download_all(&self) -> GatewayResult<Vec<String>> {
        match &self.orchestrator.shared().strategy {
            llmgw_agent::Strategy::Batch { backend, adapter, .. } => {
                let files = self.orchestrator.shared().files.lock();
                Ok(backend.try_download_all(adapter.as_ref(), &files).await?)
            }
            _ => Err(GatewayError::AdapterStrategyMismatch { strategy: "batch" }),
        }
    }

    /// Cancels outstanding async work and closes the datastore. A no-op for the sync/batch
    /// strategies, which own no background worker.
    pub async fn shutdown(&self) -> GatewayResult<()> {
        if let llmgw_agent::Strategy::Async { backend, .. } = &self.orchestrator.shared().strategy {
            backend.shutdown().await;
        }
        self.ds.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_provider::mock::MockAdapter;
    use llmgw_types::Document;

    #[tokio::test]
    async fn open_with_mismatched_adapter_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::new(dir.path().join("gw").to_string_lossy().to_string())
            .with_strategy(ConfigStrategy::Async);
        let adapter = Arc::new(MockAdapter::new());

        let err = Gateway::open(config, AdapterHandle::Sync(adapter)).await.unwrap_err();
        assert!(matches!(err, GatewayError::AdapterStrategyMismatch { strategy: "async" }));
    }

    #[tokio::test]
    async fn sync_round_trip_replays_without_a_second_adapter_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::new(dir.path().join("gw").to_string_lossy().to_string());
        let adapter = Arc::new(MockAdapter::new());
        adapter.stub("hello", "Cached response");

        let gateway = Gateway::open(config.clone(), AdapterHandle::Sync(adapter.clone()))
            .await
            .unwrap();
        let agent = gateway.agent("a");
        agent.enter();
        let (handle, _) = agent
            .ask_llm_inner(vec![Document::text("hello")], Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.resolve().await.unwrap(), "Cached response");
        assert_eq!(adapter.call_count(), 1);
        gateway.persist().await.unwrap();
        gateway.shutdown().await.unwrap();
        drop(gateway);

        // Fresh gateway, same directory: served from cache, adapter untouched.
        let adapter2 = Arc::new(MockAdapter::new());
        let gateway2 = Gateway::open(config, AdapterHandle::Sync(adapter2.clone()))
            .await
            .unwrap();
        let agent2 = gateway2.agent("a");
        agent2.enter();
        let (handle2, _) = agent2
            .ask_llm_inner(vec![Document::text("hello")], Default::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle2.resolve().await.unwrap(), "Cached response");
        assert_eq!(adapter2.call_count(), 0, "second run must not call the adapter");
    }
}
