//! [`AgentScope`]: a scoped acquisition whose exit unconditionally
//! clears the active checkpoint, persists any bound message state, and
//! swallows exactly the in-band control signals that make sense for the
//! backend in play, while letting true errors propagate.
//!
//! There is no async `Drop` in stable Rust, so this is a consuming
//! `run()` method rather than a guard object: the caller passes the
//! guarded block as an async closure and gets back whether it ran to
//! completion, was skipped by a signal, or failed.

use std::sync::Arc;

use llmgw_message::{AskOutcomeError, MessageState};
use llmgw_types::ControlSignal;

use crate::agent::Agent;
use crate::error::{AgentError, AgentResult};

/// What a guarded block can resolve to, from the scope's point of view.
#[derive(Debug)]
pub enum ScopeError {
    /// One of the signals this scope is configured to swallow.
    Signal(ControlSignal),
    /// A true error; propagates out of [`AgentScope::run`].
    Failed(AgentError),
}

pub type ScopeResult<T> = std::result::Result<T, ScopeError>;

impl From<AskOutcomeError> for ScopeError {
    fn from(err: AskOutcomeError) -> Self {
        match err {
            AskOutcomeError::Signal(signal) => ScopeError::Signal(signal),
            AskOutcomeError::Failed(boxed) => match boxed.downcast::<AgentError>() {
                Ok(agent_err) => ScopeError::Failed(*agent_err),
                Err(other) => ScopeError::Failed(AgentError::Boxed(other)),
            },
        }
    }
}

/// Which in-band signals this scope swallows. Batch strategy additionally
/// swallows `NotAvailable`; sync/async strategies never
/// raise it, so the flag is harmless there too.
pub struct AgentScope<'a> {
    agent: &'a Agent,
    swallow_not_available: bool,
    message_state: Option<&'a mut MessageState>,
}

impl<'a> AgentScope<'a> {
    pub fn new(agent: &'a Agent, swallow_not_available: bool) -> Self {
        agent.enter();
        AgentScope {
            agent,
            swallow_not_available,
            message_state: None,
        }
    }

    /// Binds a message state whose contents are persisted to C10 on exit,
    /// regardless of how the guarded block resolves.
    pub fn with_message_state(mut self, state: &'a mut MessageState) -> Self {
        self.message_state = Some(state);
        self
    }

    /// Runs `body`, then unconditionally clears the active checkpoint and
    /// persists any bound message state. `Ok(Some(value))` on success,
    /// `Ok(None)` when a swallowed signal ended the block early, `Err`
    /// for anything else.
    pub async fn run<F, Fut, T>(mut self, body: F) -> AgentResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ScopeResult<T>>,
    {
        let outcome = body().await;

        self.agent.clear_checkpoint();
        if let Some(state) = self.message_state.take() {
            self.persist_message_state(state)?;
        }

        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(ScopeError::Signal(ControlSignal::WrongCheckpoint)) => Ok(None),
            Err(ScopeError::Signal(ControlSignal::GotoCheckpoint)) => Ok(None),
            Err(ScopeError::Signal(ControlSignal::NotAvailable)) if self.swallow_not_available => Ok(None),
            Err(ScopeError::Signal(other)) => Err(AgentError::Boxed(Box::new(UnswallowedSignal(other)))),
            Err(ScopeError::Failed(err)) => Err(err),
        }
    }

    fn persist_message_state(&self, state: &MessageState) -> AgentResult<()> {
        let Some(marker) = state.persist_marker() else {
            return Ok(());
        };
        let snapshot = state.to_snapshot();
        self.agent
            .shared_files_save(marker, &snapshot)
            .map_err(AgentError::from)
    }
}

#[derive(Debug)]
struct UnswallowedSignal(ControlSignal);

impl std::fmt::Display for UnswallowedSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unswallowed control signal: {:?}", self.0)
    }
}

impl std::error::Error for UnswallowedSignal {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::GatewayShared;
    use crate::strategy::Strategy;
    use llmgw_backend::SyncBackend;
    use llmgw_files::FileManager;
    use llmgw_provider::mock::MockAdapter;
    use llmgw_store::{ColdTierPaths, Datastore, SqliteDatastore};
    use llmgw_throttle::Throttler;
    use parking_lot::Mutex;

    async fn agent_for_test(dir: &std::path::Path) -> Agent {
        let ds: Arc<dyn Datastore> = Arc::new(
            SqliteDatastore::open_in_memory(ColdTierPaths::new(dir.join("store")))
                .await
                .unwrap(),
        );
        let files = FileManager::open(dir.join("workdir")).unwrap();
        let adapter = Arc::new(MockAdapter::new());
        let backend = SyncBackend::new(ds.clone(), Arc::new(Throttler::disabled()), false);
        let shared = Arc::new(GatewayShared {
            ds,
            files: Mutex::new(files),
            strategy: Strategy::sync(backend, adapter),
            session_id: 1,
            ignore_cache: false,
            rewrite_cache: false,
        });
        Agent::new("a", shared)
    }

    #[tokio::test]
    async fn wrong_checkpoint_signal_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for_test(dir.path()).await;
        agent.enter();
        agent.when_checkpoint("first").unwrap();
        agent.goto_checkpoint("first").unwrap().unwrap_err();
        agent.clear_checkpoint();

        let scope = AgentScope::new(&agent, false);
        let result = scope
            .run(|| async {
                agent.when_checkpoint("second").map_err(ScopeError::Signal)?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn a_true_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent_for_test(dir.path()).await;
        let scope = AgentScope::new(&agent, false);
        let result = scope
            .run(|| async { Err::<(), _>(ScopeError::Failed(AgentError::ProviderIncompatible {
                declared: "x".into(),
                adapter: "y".into(),
            })) })
            .await;
        assert!(result.is_err());
    }
}
