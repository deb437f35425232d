//! [`BatchBackend`]: defers every call into a buffer, then submits it in
//! provider-side batch jobs on an explicit [`BatchBackend::execute_batch`]
//! call.
//!
//! `execute_batch` always partitions the buffer by model name before
//! chunking it to `max_batch_size` calls: a flat, ungrouped chunking path
//! would mix models within one provider batch job, so that path does not
//! exist here.

use std::collections::BTreeMap;
use std::sync::Arc;

use llmgw_files::FileManager;
use llmgw_provider::{BatchProviderAdapter, BatchStatus, CommonQueryParameters};
use llmgw_store::Datastore;
use llmgw_types::{CallIdentifier, ControlSignal, ParsedError};
use parking_lot::Mutex;

use crate::error::{BackendError, BackendResult};

#[derive(Clone)]
struct BufferedCall {
    cid: CallIdentifier,
    model_name: String,
    line: String,
    custom_id: String,
}

/// The batch jobs one `execute_batch` call submitted.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    pub batch_uuids: Vec<String>,
}

pub struct BatchBackend {
    ds: Arc<dyn Datastore>,
    rewrite_cache: bool,
    buffer: Mutex<Vec<BufferedCall>>,
}

impl BatchBackend {
    pub fn new(ds: Arc<dyn Datastore>, rewrite_cache: bool) -> Self {
        BatchBackend {
            ds,
            rewrite_cache,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Buffers the call for the next `execute_batch`. Always defers —
    /// there is no immediate value to hand back — unless `cid` already
    /// has a live row in some other pending batch (I2), in which case
    /// the duplicate submission is silently dropped.
    pub async fn submit_query(
        &self,
        adapter: &dyn BatchProviderAdapter,
        params: &CommonQueryParameters,
        cid: &CallIdentifier,
        checkpoint: Option<&str>,
    ) -> BackendResult<ControlSignal> {
        if self.ds.call_in_pending_batch(cid).await? {
            tracing::debug!(agent = %cid.agent_name, "call already pending in a batch, dropping duplicate");
            return Ok(ControlSignal::NotAvailable);
        }

        let custom_id = cid.custom_id(checkpoint);
        let line = adapter.prepare_batch_call(params, &custom_id)?;
        self.buffer.lock().push(BufferedCall {
            cid: cid.clone(),
            model_name: params.llm.model_name.clone(),
            line,
            custom_id,
        });
        Ok(ControlSignal::NotAvailable)
    }

    /// Partitions the buffer by model, chunks each partition to
    /// `max_batch_size`, optionally asks `confirm` to approve the
    /// submission (argument order: `(chunk_count, total_calls)`), and
    /// submits each chunk as its own provider batch job.
    ///
    /// If `confirm` declines, the buffer is left untouched so a later
    /// call can retry once more calls have accumulated.
    pub async fn execute_batch(
        &self,
        adapter: &dyn BatchProviderAdapter,
        max_batch_size: usize,
        confirm: Option<&(dyn Fn(usize, usize) -> bool + Send + Sync)>,
    ) -> BackendResult<Cohort> {
        let drained: Vec<BufferedCall> = std::mem::take(&mut *self.buffer.lock());
        if drained.is_empty() {
            return Ok(Cohort::default());
        }

        // Always partition by model first: never submit the flat,
        // ungrouped buffer as one job.
        let mut by_model: BTreeMap<String, Vec<BufferedCall>> = BTreeMap::new();
        for call in drained {
            by_model.entry(call.model_name.clone()).or_default().push(call);
        }

        let chunk_size = max_batch_size.max(1);
        let mut chunks: Vec<(String, Vec<BufferedCall>)> = Vec::new();
        for (model, calls) in by_model {
            for chunk in calls.chunks(chunk_size) {
                chunks.push((model.clone(), chunk.to_vec()));
            }
        }

        if let Some(confirm) = confirm {
            let total: usize = chunks.iter().map(|(_, c)| c.len()).sum();
            if !confirm(chunks.len(), total) {
                let mut buffer = self.buffer.lock();
                *buffer = chunks.into_iter().flat_map(|(_, c)| c).collect();
                return Ok(Cohort::default());
            }
        }

        let mut batch_uuids = Vec::with_capacity(chunks.len());
        for (model, calls) in chunks {
            let lines: Vec<String> = calls.iter().map(|c| c.line.clone()).collect();
            let uuid = adapter.submit_batch(&lines, &model)?;
            let entries: Vec<(CallIdentifier, String)> = calls
                .iter()
                .map(|c| (c.cid.clone(), c.custom_id.clone()))
                .collect();
            self.ds.store_pending_batch(&uuid, &entries).await?;
            tracing::info!(batch_uuid = %uuid, model = %model, count = entries.len(), "submitted batch job");
            batch_uuids.push(uuid);
        }

        Ok(Cohort { batch_uuids })
    }

    /// Polls every still-pending batch UUID, stores ready/error results,
    /// archives each job's raw output, and clears its pending rows.
    /// Returns the UUIDs that completed this call.
    pub async fn try_download_all(
        &self,
        adapter: &dyn BatchProviderAdapter,
        files: &FileManager,
    ) -> BackendResult<Vec<String>> {
        let mut completed = Vec::new();

        for uuid in self.ds.list_pending_batch_uuids().await? {
            let results = match adapter.download_batch(&uuid) {
                Ok(results) => results,
                Err(llmgw_provider::ProviderError::BatchNotReady(_)) => continue,
                Err(err) => return Err(err.into()),
            };
            if results.is_empty() {
                continue;
            }

            for result in &results {
                match result.status {
                    BatchStatus::Ready => {
                        let responses = result.parsed_responses.clone().unwrap_or_default();
                        self.ds
                            .store_ready_batch(&uuid, &responses, self.rewrite_cache)
                            .await?;
                    }
                    BatchStatus::Error => {
                        let records = self.ds.retrieve_batch_cids(&uuid).await?;
                        let err = ParsedError {
                            message: result.raw_output.clone(),
                            code: None,
                            error_id: None,
                        };
                        for record in &records {
                            self.ds.store_error(&record.cid, &err).await?;
                        }
                    }
                }
                archive_raw_output(files, &uuid, &result.raw_output)?;
            }

            self.ds.clear_batch_pending(&uuid).await?;
            completed.push(uuid);
        }

        Ok(completed)
    }
}

fn archive_raw_output(files: &FileManager, batch_uuid: &str, raw_output: &str) -> BackendResult<()> {
    use std::io::Write;

    let dir = files.allocate_batch_out_dir()?;
    let path = dir.join(format!("{batch_uuid}.zip"));
    let file = std::fs::File::create(&path).map_err(|e| BackendError::Archive(e.to_string()))?;

    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("raw_output.jsonl", options)
        .map_err(|e| BackendError::Archive(e.to_string()))?;
    zip.write_all(raw_output.as_bytes())
        .map_err(|e| BackendError::Archive(e.to_string()))?;
    zip.finish().map_err(|e| BackendError::Archive(e.to_string()))?;
    Ok(())
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

    fn params(model: &str) -> CommonQueryParameters {
        CommonQueryParameters {
            instructions: None,
            documents: vec![],
            llm: LlmIdentity::resolve(model, None),
            text_format: None,
            tools: None,
        }
    }

    #[tokio::test]
    async fn submit_always_defers() {
        let ds = in_memory_store().await;
        let backend = BatchBackend::new(ds, false);
        let adapter = MockAdapter::new();
        let cid = CallIdentifier::new("agent", "h", 0, 1);

        let outcome = backend
            .submit_query(&adapter, &params("gpt-4o"), &cid, Some("chk"))
            .await
            .unwrap();
        assert_eq!(outcome, ControlSignal::NotAvailable);
    }

    #[tokio::test]
    async fn execute_batch_partitions_by_model_before_chunking() {
        let ds = in_memory_store().await;
        let backend = BatchBackend::new(ds.clone(), false);
        let adapter = MockAdapter::new();

        for (i, model) in ["gpt-4o", "gpt-4o-mini", "gpt-4o"].iter().enumerate() {
            let cid = CallIdentifier::new("agent", format!("h{i}"), i as u64, 1);
            backend
                .submit_query(&adapter, &params(model), &cid, None)
                .await
                .unwrap();
        }

        let cohort = backend.execute_batch(&adapter, 10, None).await.unwrap();
        // Two distinct models => two separate batch jobs, even though
        // everything would fit in one chunk of size 10.
        assert_eq!(cohort.batch_uuids.len(), 2);
    }

    #[tokio::test]
    async fn a_declined_confirmation_leaves_the_buffer_intact() {
        let ds = in_memory_store().await;
        let backend = BatchBackend::new(ds, false);
        let adapter = MockAdapter::new();
        let cid = CallIdentifier::new("agent", "h", 0, 1);
        backend
            .submit_query(&adapter, &params("gpt-4o"), &cid, None)
            .await
            .unwrap();

        let decline = |_chunks: usize, _total: usize| false;
        let cohort = backend.execute_batch(&adapter, 10, Some(&decline)).await.unwrap();
        assert!(cohort.batch_uuids.is_empty());

        let retried = backend.execute_batch(&adapter, 10, None).await.unwrap();
        assert_eq!(retried.batch_uuids.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_submission_of_an_already_pending_call_is_dropped() {
        let ds = in_memory_store().await;
        let backend = BatchBackend::new(ds.clone(), false);
        let adapter = MockAdapter::new();
        let cid = CallIdentifier::new("agent", "h", 0, 1);

        backend.submit_query(&adapter, &params("gpt-4o"), &cid, None).await.unwrap();
        backend.execute_batch(&adapter, 10, None).await.unwrap();

        // cid now has a live row in a pending batch; resubmitting it
        // must not add a second buffered copy.
        backend.submit_query(&adapter, &params("gpt-4o"), &cid, None).await.unwrap();
        let cohort = backend.execute_batch(&adapter, 10, None).await.unwrap();
        assert!(cohort.batch_uuids.is_empty());
    }
}
