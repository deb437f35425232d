//! [`AgentOrchestrator`]: hands out one [`Agent`] per name, lazily
//! constructed and cached for the lifetime of the gateway.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::agent::{Agent, GatewayShared};

pub struct AgentOrchestrator {
    shared: Arc<GatewayShared>,
    agents: Mutex<HashMap<String, Arc<Agent>>>,
}

impl AgentOrchestrator {
    pub fn new(shared: Arc<GatewayShared>) -> Self {
        AgentOrchestrator {
            shared,
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the agent for `name`, creating and caching it on first
    /// use. Reading its persisted checkpoint metadata happens once, at
    /// construction.
    pub fn agent(&self, name: &str) -> Arc<Agent> {
        let mut agents = self.agents.lock();
        agents
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Agent::new(name, self.shared.clone())))
            .clone()
    }

    pub fn shared(&self) -> &Arc<GatewayShared> {
        &self.shared
    }

    /// Flushes the file manager's pending metadata writes.
    pub fn persist(&self) -> crate::error::AgentResult<()> {
        self.shared.files.lock().persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use llmgw_backend::SyncBackend;
    use llmgw_files::FileManager;
    use llmgw_provider::mock::MockAdapter;
    use llmgw_store::{ColdTierPaths, Datastore, SqliteDatastore};
    use llmgw_throttle::Throttler;

    async fn shared_for_test(dir: &std::path::Path) -> Arc<GatewayShared> {
        let ds: Arc<dyn Datastore> = Arc::new(
            SqliteDatastore::open_in_memory(ColdTierPaths::new(dir.join("store")))
                .await
                .unwrap(),
        );
        let files = FileManager::open(dir.join("workdir")).unwrap();
        let adapter = Arc::new(MockAdapter::new());
        let backend = SyncBackend::new(ds.clone(), Arc::new(Throttler::disabled()), false);
        Arc::new(GatewayShared {
            ds,
            files: Mutex::new(files),
            strategy: Strategy::sync(backend, adapter),
            session_id: 1,
            ignore_cache: false,
            rewrite_cache: false,
        })
    }

    #[tokio::test]
    async fn same_name_returns_the_same_agent() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let orchestrator = AgentOrchestrator::new(shared);

        let a1 = orchestrator.agent("worker");
        a1.enter();
        let a2 = orchestrator.agent("worker");
        assert!(Arc::ptr_eq(&a1, &a2));
    }

    #[tokio::test]
    async fn distinct_names_get_distinct_agents() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let orchestrator = AgentOrchestrator::new(shared);

        let a = orchestrator.agent("a");
        let b = orchestrator.agent("b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "a");
        assert_eq!(b.name(), "b");
    }
}
