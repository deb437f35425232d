//! [`AsyncBackend`]: a dedicated background worker that owns a
//! [`tokio::task::JoinSet`] of in-flight provider calls, fed by an
//! `mpsc` submission channel and reporting completion through a
//! `oneshot` channel created per submitted call. `resolve` (the
//! [`BackendHandle`] side of a `Pending` handle) waits only on its own
//! call's oneshot — a fast call never blocks behind a slow unrelated
//! one, which is the whole point of this targeted-wait design.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use llmgw_provider::{AsyncProviderAdapter, CommonQueryParameters, ProviderResult};
use llmgw_response::{BackendHandle, ResponseHandle};
use llmgw_store::Datastore;
use llmgw_types::{CallIdentifier, ParsedError, ParsedResponse};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;

use crate::error::{BackendError, BackendResult};

/// Identifies a live call independent of `session_id`, mirroring
/// [`CallIdentifier::matches`].
type CidKey = (String, String, u64);

fn cid_key(cid: &CallIdentifier) -> CidKey {
    (cid.agent_name.clone(), cid.doc_hash.clone(), cid.seq_id)
}

struct Submission {
    cid: CallIdentifier,
    adapter: Arc<dyn AsyncProviderAdapter>,
    params: CommonQueryParameters,
    done: oneshot::Sender<()>,
}

enum WorkerMsg {
    Submit(Submission),
    PersistAll(oneshot::Sender<()>),
}

type TaskOutput = (CallIdentifier, oneshot::Sender<()>, ProviderResult<ParsedResponse>);

pub struct AsyncBackend {
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<WorkerMsg>>>,
    waiters: parking_lot::Mutex<HashMap<CidKey, oneshot::Receiver<()>>>,
    worker: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    ds: Arc<dyn Datastore>,
}

impl AsyncBackend {
    /// Spawns the background worker and returns a handle to it. `self`
    /// is always held behind `Arc` — a `Pending` [`ResponseHandle`]
    /// closes over `Arc<dyn BackendHandle>`, which this type implements.
    pub fn new(ds: Arc<dyn Datastore>, rewrite_cache: bool, max_concurrent: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let worker = tokio::spawn(run_worker(rx, ds.clone(), rewrite_cache, semaphore));

        Arc::new(AsyncBackend {
            tx: parking_lot::Mutex::new(Some(tx)),
            waiters: parking_lot::Mutex::new(HashMap::new()),
            worker: parking_lot::Mutex::new(Some(worker)),
            ds,
        })
    }

    /// Hands `params` to the worker and returns a `Pending` handle
    /// immediately. There is no control-signal path — submission always
    /// succeeds unless the backend has already been shut down.
    pub fn submit_query(
        self: &Arc<Self>,
        adapter: Arc<dyn AsyncProviderAdapter>,
        params: CommonQueryParameters,
        cid: CallIdentifier,
    ) -> BackendResult<ResponseHandle> {
        let (done_tx, done_rx) = oneshot::channel();
        self.waiters.lock().insert(cid_key(&cid), done_rx);

        let submission = Submission {
            cid: cid.clone(),
            adapter,
            params,
            done: done_tx,
        };
        self.send(WorkerMsg::Submit(submission))?;

        let backend: Arc<dyn BackendHandle> = self.clone();
        Ok(ResponseHandle::pending(cid, backend))
    }

    /// Drains every still-running task, flushing the datastore once
    /// nothing is left in flight. Mirrors `AsyncBackend.persist(timeout=30)`.
    pub async fn persist(&self) -> BackendResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(WorkerMsg::PersistAll(reply_tx))?;
        tokio::time::timeout(Duration::from_secs(30), reply_rx)
            .await
            .map_err(|_| BackendError::Timeout)?
            .map_err(|_| BackendError::ShuttingDown)
    }

    /// Closes the submission channel and aborts any task still running,
    /// waiting up to 5 seconds for the worker to unwind.
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                tracing::warn!("async backend worker did not shut down within 5s");
            }
        }
    }

    fn send(&self, msg: WorkerMsg) -> BackendResult<()> {
        self.tx
            .lock()
            .as_ref()
            .ok_or(BackendError::ShuttingDown)?
            .send(msg)
            .map_err(|_| BackendError::ShuttingDown)
    }
}

#[async_trait]
impl BackendHandle for AsyncBackend {
    async fn resolve(&self, cid: &CallIdentifier) -> llmgw_response::Result<ParsedResponse> {
        let receiver = self.waiters.lock().remove(&cid_key(cid));
        if let Some(rx) = receiver {
            // Either it resolves, or the sender was dropped (abort on
            // shutdown) — either way fall through to the datastore read.
            let _ = rx.await;
        }
        self.ds
            .retrieve(cid, false)
            .await
            .map_err(|err| llmgw_response::ResponseError::Backend(err.to_string()))?
            .ok_or_else(|| llmgw_response::ResponseError::Integrity(format!("{cid:?}")))
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<WorkerMsg>,
    ds: Arc<dyn Datastore>,
    rewrite_cache: bool,
    semaphore: Arc<Semaphore>,
) {
    let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(WorkerMsg::Submit(submission)) => {
                        let sem = semaphore.clone();
                        tasks.spawn(async move {
                            let _permit = sem.acquire_owned().await.expect("semaphore never closes");
                            let Submission { cid, adapter, params, done } = submission;
                            let result = adapter
                                .prepare_async_call(params)
                                .await
                                .and_then(|raw| adapter.parse_response(&raw));
                            (cid, done, result)
                        });
                    }
                    Some(WorkerMsg::PersistAll(reply)) => {
                        while let Some(res) = tasks.join_next().await {
                            handle_completion(res, &ds, rewrite_cache).await;
                        }
                        if let Err(err) = ds.persist().await {
                            tracing::error!(?err, "async backend: datastore persist failed");
                        }
                        let _ = reply.send(());
                    }
                    None => {
                        tasks.abort_all();
                        break;
                    }
                }
            }
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                handle_completion(res, &ds, rewrite_cache).await;
            }
        }
    }
}

async fn handle_completion(
    res: Result<TaskOutput, tokio::task::JoinError>,
    ds: &Arc<dyn Datastore>,
    rewrite_cache: bool,
) {
    let Ok((cid, done, result)) = res else {
        tracing::debug!("async backend: task aborted or panicked");
        return;
    };

    match result {
        Ok(parsed) => {
            if let Err(err) = ds.store(&cid, &parsed, rewrite_cache).await {
                tracing::error!(?err, agent = %cid.agent_name, "async backend: store failed");
            }
        }
        Err(err) => {
            let parsed_err = ParsedError {
                message: err.to_string(),
                code: None,
                error_id: None,
            };
            if let Err(store_err) = ds.store_error(&cid, &parsed_err).await {
                tracing::error!(?store_err, agent = %cid.agent_name, "async backend: store_error failed");
            }
        }
    }

    // Dropping `done` without sending also wakes a waiter (as `RecvError`),
    // so this never needs a fallible match.
    let _ = done.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_provider::mock::MockAdapter;
    use llmgw_store::{ColdTierPaths, SqliteDatastore};
    use llmgw_types::LlmIdentity;
    use std::time::Duration as StdDuration;

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
    async fn submit_then_resolve_round_trips() {
        let ds = in_memory_store().await;
        let backend = AsyncBackend::new(ds.clone(), false, 4);
        let adapter = Arc::new(MockAdapter::new());
        adapter.stub("", "async hello");

        let cid = CallIdentifier::new("agent", "h", 0, 1);
        let handle = backend.submit_query(adapter, params(), cid).unwrap();
        assert!(!handle.is_ready());
        assert_eq!(handle.resolve().await.unwrap(), "async hello");
        backend.shutdown().await;
    }

    #[tokio::test]
    async fn a_fast_call_resolves_without_waiting_on_a_slow_one() {
        let ds = in_memory_store().await;
        let backend = AsyncBackend::new(ds, false, 4);
        let adapter = Arc::new(MockAdapter::new());
        adapter.stub_delay("slow", StdDuration::from_millis(200));
        adapter.stub("slow", "slow done");
        adapter.stub("fast", "fast done");

        let mut slow_params = params();
        slow_params.documents = vec![llmgw_types::Document::text("slow")];
        let mut fast_params = params();
        fast_params.documents = vec![llmgw_types::Document::text("fast")];

        let slow_cid = CallIdentifier::new("agent", "slow-hash", 0, 1);
        let fast_cid = CallIdentifier::new("agent", "fast-hash", 1, 1);

        let slow_handle = backend
            .submit_query(adapter.clone(), slow_params, slow_cid)
            .unwrap();
        let fast_handle = backend.submit_query(adapter, fast_params, fast_cid).unwrap();

        let start = std::time::Instant::now();
        assert_eq!(fast_handle.resolve().await.unwrap(), "fast done");
        assert!(start.elapsed() < StdDuration::from_millis(150), "fast call waited on the slow one");

        assert_eq!(slow_handle.resolve().await.unwrap(), "slow done");
        backend.shutdown().await;
    }
}
