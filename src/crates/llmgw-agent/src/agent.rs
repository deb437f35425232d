//! [`Agent`]: the per-agent-name checkpoint/counter state machine and
//! cache-first dispatch for `askLLM`.
//!
//! An `Agent` is cheap to hand out as `Arc<Agent>` — all of the heavy
//! state (datastore, backend, file manager) lives in the shared
//! [`GatewayShared`] every agent under one gateway points at; only the
//! transient counters in [`TransientState`] are per-agent.

use std::sync::Arc;

use async_trait::async_trait;
use llmgw_files::FileManager;
use llmgw_message::{AskOptions, AskOutcome, AskOutcomeError, AskOutcomeMeta, Askable};
use llmgw_provider::CommonQueryParameters;
use llmgw_response::ResponseHandle;
use llmgw_store::Datastore;
use llmgw_types::{CallIdentifier, ControlSignal, Document, LlmIdentity, Provider, WorkingMetadata};
use parking_lot::Mutex;

use crate::error::{AgentError, AgentResult};
use crate::state::TransientState;
use crate::strategy::Strategy;

/// Everything every [`Agent`] under one opened gateway shares. Owned by
/// `llmgw::Gateway`, handed to each agent as an `Arc`.
pub struct GatewayShared {
    pub ds: Arc<dyn Datastore>,
    pub files: Mutex<FileManager>,
    pub strategy: Strategy,
    pub session_id: u64,
    pub ignore_cache: bool,
    pub rewrite_cache: bool,
}

/// One named agent's checkpoint/counter state machine.
///
/// Cheaply cloned via `Arc`; `askLLM`/checkpoint methods all take `&self`
/// and serialize access to [`TransientState`] through an internal mutex.
pub struct Agent {
    name: String,
    shared: Arc<GatewayShared>,
    transient: Mutex<TransientState>,
}

impl Agent {
    pub fn new(name: impl Into<String>, shared: Arc<GatewayShared>) -> Self {
        let name = name.into();
        Agent {
            name,
            shared,
            transient: Mutex::new(TransientState {
                anonymous_counter: 0,
                active_checkpoint: None,
                checkpoint_counter: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resets the anonymous counter for a new context entry. Does *not*
    /// touch the persisted checkpoint — only [`Agent::goto_checkpoint`]
    /// mutates that.
    pub fn enter(&self) {
        self.transient.lock().reset_for_entry();
    }

    fn persisted_metadata(&self) -> WorkingMetadata {
        self.shared.files.lock().agent_metadata(&self.name)
    }

    /// `whenCheckpoint(name)`.
    pub fn when_checkpoint(&self, name: &str) -> llmgw_types::Outcome<()> {
        let persisted = self.persisted_metadata();
        let mut transient = self.transient.lock();

        match &persisted.latest_checkpoint {
            None => {
                // Unset: this call claims the checkpoint, persisting
                // `latest_checkpoint` so a second, differently-named
                // `when_checkpoint` in the same run sees it taken and is
                // skipped instead of also entering.
                self.shared.files.lock().set_agent_metadata(
                    self.name.clone(),
                    WorkingMetadata {
                        latest_checkpoint: Some(name.to_string()),
                        checkpoint_counter: persisted.checkpoint_counter,
                    },
                );
                transient.active_checkpoint = Some(name.to_string());
                transient.checkpoint_counter = Some(persisted.checkpoint_counter);
                Ok(())
            }
            Some(latest) if latest == name => {
                transient.active_checkpoint = Some(name.to_string());
                transient.checkpoint_counter = Some(persisted.checkpoint_counter);
                Ok(())
            }
            Some(_) => Err(ControlSignal::WrongCheckpoint),
        }
    }

    /// `whenCheckpointPattern(regex)`.
    pub fn when_checkpoint_pattern(&self, pattern: &regex::Regex) -> llmgw_types::Outcome<()> {
        let persisted = self.persisted_metadata();
        let mut transient = self.transient.lock();

        match &persisted.latest_checkpoint {
            Some(latest) if pattern.is_match(latest) => {
                transient.active_checkpoint = Some(latest.clone());
                transient.checkpoint_counter = Some(persisted.checkpoint_counter);
                Ok(())
            }
            _ => Err(ControlSignal::WrongCheckpoint),
        }
    }

    /// `gotoCheckpoint(next)`. Persists the transition
    /// and raises `GotoCheckpoint` so the caller's scope skips whatever
    /// follows.
    pub fn goto_checkpoint(&self, next: &str) -> AgentResult<llmgw_types::Outcome<()>> {
        let counter = {
            let transient = self.transient.lock();
            transient.checkpoint_counter.unwrap_or(0)
        };

        {
            let mut files = self.shared.files.lock();
            files.set_agent_metadata(
                self.name.clone(),
                WorkingMetadata {
                    latest_checkpoint: Some(next.to_string()),
                    checkpoint_counter: counter,
                },
            );
            files.persist()?;
            files.log_checkpoint_event("goto", &self.name, Some(next), Some(counter))?;
        }

        tracing::info!(agent = %self.name, checkpoint = %next, counter, "checkpoint transition");
        Ok(Err(ControlSignal::GotoCheckpoint))
    }

    /// Clears the transient checkpoint, unconditionally — the
    /// `AgentScope` exit guarantee.
    pub fn clear_checkpoint(&self) {
        self.transient.lock().clear_checkpoint();
    }

    /// `askLLM`.
    pub async fn ask_llm_inner(
        &self,
        docs: Vec<Document>,
        opts: AskOptions,
    ) -> AgentResult<llmgw_types::Outcome<(ResponseHandle, AskOutcomeMeta)>> {
        // 1. resolve llm
        let llm = opts.llm.clone().unwrap_or_else(|| self.shared.strategy.default_llm());

        // 2. salt terms
        let mut salt_terms = opts.salt.clone();
        if opts.hash_by.iter().any(|k| k == "llm") {
            salt_terms.push(llm.label.clone());
        }

        // 3. sequence id
        let (seq_id, used_checkpoint) = self.transient.lock().next_seq_id();

        // 4. doc hash
        let doc_hash = llmgw_hash::compute_doc_hash(&opts.instructions, &docs, &salt_terms)?;

        // 5. CID
        let provider_type = llm
            .provider
            .clone()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| self.shared.strategy.info().provider_type.clone());
        let cid = CallIdentifier::new(self.name.clone(), doc_hash.to_string(), seq_id, self.shared.session_id)
            .with_meta(Some(provider_type), opts.tag.clone());

        if opts.save_input {
            self.save_input(&cid, &opts, &docs)?;
        }

        // 6. cache lookup
        if !self.shared.ignore_cache {
            if let Some(parsed) = self.shared.ds.retrieve(&cid, false).await? {
                tracing::debug!(agent = %self.name, seq_id, "cache hit");
                let handle = ResponseHandle::ready_with_cid(parsed, cid);
                let meta = AskOutcomeMeta { seq_id, used_checkpoint };
                return Ok(Ok((handle, meta)));
            }
        }

        // 7. provider compatibility, then dispatch
        if !self.shared.strategy.info().compatible_with(&llm) {
            return Err(AgentError::ProviderIncompatible {
                declared: llm.provider.as_ref().map(Provider::as_str).unwrap_or("?").to_string(),
                adapter: self.shared.strategy.info().provider_type.clone(),
            });
        }

        let params = CommonQueryParameters {
            instructions: opts.instructions.clone(),
            documents: docs,
            llm,
            text_format: opts.text_format.clone(),
            tools: opts.tools.clone(),
        };

        let meta = AskOutcomeMeta { seq_id, used_checkpoint };
        match &self.shared.strategy {
            crate::strategy::Strategy::Sync { backend, adapter, .. } => {
                let handle = backend.submit_query(adapter.as_ref(), &params, &cid).await?;
                Ok(Ok((handle, meta)))
            }
            crate::strategy::Strategy::Async { backend, adapter, .. } => {
                let handle = backend.submit_query(adapter.clone(), params, cid)?;
                Ok(Ok((handle, meta)))
            }
            crate::strategy::Strategy::Batch { backend, adapter, .. } => {
                let checkpoint = { self.transient.lock().active_checkpoint.clone() };
                let signal = backend
                    .submit_query(adapter.as_ref(), &params, &cid, checkpoint.as_deref())
                    .await?;
                Ok(Err(signal))
            }
        }
    }

    /// Saves an arbitrary bincode-serializable blob under `key` in the
    /// shared working directory, overwriting any previous value. Used by
    /// [`crate::scope::AgentScope`] to persist message-state snapshots on
    /// scope exit.
    pub fn shared_files_save<T: serde::Serialize>(&self, key: &str, value: &T) -> llmgw_files::Result<()> {
        self.shared.files.lock().save_userdata(key, value, true)
    }

    fn save_input(&self, cid: &CallIdentifier, opts: &AskOptions, docs: &[Document]) -> AgentResult<()> {
        #[derive(serde::Serialize)]
        struct SavedInput<'a> {
            instructions: &'a llmgw_types::Instructions,
            documents: &'a [Document],
        }
        let key = cid.custom_id(None);
        self.shared.files.lock().save_userdata(
            &key,
            &SavedInput {
                instructions: &opts.instructions,
                documents: docs,
            },
            false,
        )?;
        Ok(())
    }
}

#[async_trait]
impl Askable for Agent {
    async fn ask_llm(
        &self,
        docs: Vec<Document>,
        opts: AskOptions,
    ) -> AskOutcome<(ResponseHandle, AskOutcomeMeta)> {
        match self.ask_llm_inner(docs, opts).await {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(signal)) => Err(AskOutcomeError::Signal(signal)),
            Err(err) => Err(AskOutcomeError::Failed(Box::new(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_backend::SyncBackend;
    use llmgw_provider::mock::MockAdapter;
    use llmgw_store::{ColdTierPaths, SqliteDatastore};
    use llmgw_throttle::Throttler;

    async fn shared_for_test(dir: &std::path::Path) -> Arc<GatewayShared> {
        let ds: Arc<dyn Datastore> = Arc::new(
            SqliteDatastore::open_in_memory(ColdTierPaths::new(dir.join("store")))
                .await
                .unwrap(),
        );
        let files = FileManager::open(dir.join("workdir")).unwrap();
        let adapter = Arc::new(MockAdapter::new());
        adapter.stub("", "hi there");
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
    async fn second_identical_call_hits_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let agent = Agent::new("a", shared);
        agent.enter();

        let opts = AskOptions::default();
        let (h1, m1) = agent
            .ask_llm_inner(vec![Document::text("hello")], opts.clone())
            .await
            .unwrap()
            .unwrap();
        assert!(h1.is_ready());
        assert_eq!(m1.seq_id, 0);

        agent.enter();
        let (h2, m2) = agent
            .ask_llm_inner(vec![Document::text("hello")], opts)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h2.resolve().await.unwrap(), "hi there");
        assert_eq!(m2.seq_id, 0, "re-entering resets the anonymous counter");
    }

    #[tokio::test]
    async fn when_checkpoint_signals_wrong_checkpoint_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let agent = Agent::new("a", shared);
        agent.enter();

        assert!(agent.when_checkpoint("first").is_ok());
        agent.goto_checkpoint("first").unwrap().unwrap_err();
        agent.clear_checkpoint();

        assert_eq!(agent.when_checkpoint("second"), Err(ControlSignal::WrongCheckpoint));
        assert!(agent.when_checkpoint("first").is_ok());
    }

    #[tokio::test]
    async fn when_checkpoint_claims_latest_checkpoint_on_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let agent = Agent::new("a", shared);
        agent.enter();

        assert!(agent.when_checkpoint("first").is_ok());
        assert_eq!(
            agent.when_checkpoint("second"),
            Err(ControlSignal::WrongCheckpoint),
            "first when_checkpoint must claim latest_checkpoint so a second, \
             differently-named block in the same run is skipped"
        );
    }

    #[tokio::test]
    async fn resumed_agent_with_a_checkpoint_still_starts_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let agent = Agent::new("a", shared.clone());
        agent.enter();
        agent.when_checkpoint("chk").unwrap();
        agent.goto_checkpoint("chk").unwrap().unwrap_err();
        agent.clear_checkpoint();

        // Re-opening the agent (new process, same persisted metadata)
        // must not seed `active_checkpoint` from the persisted value —
        // it is transient and only `when_checkpoint` sets it.
        let resumed = Agent::new("a", shared);
        resumed.enter();
        let (seq_id, used_checkpoint) = resumed.transient.lock().next_seq_id();
        assert_eq!(seq_id, 0);
        assert!(!used_checkpoint, "a fresh context entry must start anonymous");
    }

    #[tokio::test]
    async fn provider_mismatch_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let shared = shared_for_test(dir.path()).await;
        let agent = Agent::new("a", shared);
        agent.enter();

        let mut opts = AskOptions::default();
        opts.llm = Some(LlmIdentity::resolve("claude-sonnet-4-5", Some(Provider::Anthropic)));

        let err = agent
            .ask_llm_inner(vec![Document::text("hi")], opts)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderIncompatible { .. }));
    }
}
