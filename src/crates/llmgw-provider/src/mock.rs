//! A deterministic, in-memory provider used only by this workspace's own
//! tests and examples. No network code; responses are canned ahead of
//! time, keyed by the concatenated text of the request's documents.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use llmgw_types::{Document, LlmIdentity, ParsedResponse, Provider};

use crate::{
    BatchResult, BatchStatus, CommonQueryParameters, ProviderAdapter, ProviderError,
    ProviderResult, RawResponse, SyncProviderAdapter,
};

fn prompt_key(params: &CommonQueryParameters) -> String {
    params
        .documents
        .iter()
        .map(|d| match d {
            Document::Text { content } => content.clone(),
            Document::RoleText { content, .. } => content.clone(),
            Document::FunctionCallOutput { content, .. } => content.clone(),
            _ => String::new(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct Batch {
    lines: Vec<(String, String)>, // (custom_id, response text)
}

pub struct MockAdapter {
    canned: Mutex<HashMap<String, String>>,
    call_count: Mutex<u32>,
    async_delay: Mutex<HashMap<String, Duration>>,
    batches: Mutex<HashMap<String, Batch>>,
    pending_lines: Mutex<Vec<(String, String)>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        MockAdapter {
            canned: Mutex::new(HashMap::new()),
            call_count: Mutex::new(0),
            async_delay: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
            pending_lines: Mutex::new(Vec::new()),
        }
    }

    /// Registers the text a matching request should receive back.
    pub fn stub(&self, prompt: impl Into<String>, response: impl Into<String>) {
        self.canned.lock().insert(prompt.into(), response.into());
    }

    /// Makes a future prepared for `prompt` sleep for `delay` before
    /// resolving, for exercising out-of-order async completion (S4).
    pub fn stub_delay(&self, prompt: impl Into<String>, delay: Duration) {
        self.async_delay.lock().insert(prompt.into(), delay);
    }

    pub fn call_count(&self) -> u32 {
        *self.call_count.lock()
    }

    fn respond(&self, params: &CommonQueryParameters) -> ProviderResult<RawResponse> {
        *self.call_count.lock() += 1;
        let key = prompt_key(params);
        let text = self
            .canned
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("echo: {key}"));
        Ok(serde_json::json!({ "text": text }))
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for MockAdapter {
    fn provider_type(&self) -> &str {
        "mock"
    }

    fn default_identity(&self) -> LlmIdentity {
        LlmIdentity {
            label: "mock-model".into(),
            provider: Some(Provider::Other("mock".into())),
            model_name: "mock-model".into(),
        }
    }

    fn parse_response(&self, raw: &RawResponse) -> ProviderResult<ParsedResponse> {
        let text = raw
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse("missing `text` field".into()))?;
        let mut parsed = ParsedResponse::new(text);
        parsed.custom_id = raw
            .get("custom_id")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(parsed)
    }
}

impl SyncProviderAdapter for MockAdapter {
    fn prepare_sync_call(&self, params: &CommonQueryParameters) -> ProviderResult<RawResponse> {
        self.respond(params)
    }
}

#[async_trait]
impl crate::AsyncProviderAdapter for MockAdapter {
    async fn prepare_async_call(
        &self,
        params: CommonQueryParameters,
    ) -> ProviderResult<RawResponse> {
        let key = prompt_key(&params);
        let delay = self.async_delay.lock().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.respond(&params)
    }
}

impl crate::BatchProviderAdapter for MockAdapter {
    fn prepare_batch_call(
        &self,
        params: &CommonQueryParameters,
        custom_id: &str,
    ) -> ProviderResult<String> {
        let key = prompt_key(params);
        let text = self
            .canned
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| format!("echo: {key}"));
        self.pending_lines
            .lock()
            .push((custom_id.to_string(), text));
        Ok(format!("{{\"custom_id\":\"{custom_id}\"}}"))
    }

    fn submit_batch(&self, lines: &[String], _model: &str) -> ProviderResult<String> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let mut pending = self.pending_lines.lock();
        let mut taken = Vec::with_capacity(lines.len());
        for _ in lines {
            if let Some(entry) = pending.pop() {
                taken.push(entry);
            }
        }
        self.batches
            .lock()
            .insert(uuid.clone(), Batch { lines: taken });
        Ok(uuid)
    }

    fn download_batch(&self, batch_uuid: &str) -> ProviderResult<Vec<BatchResult>> {
        let batch = self
            .batches
            .lock()
            .remove(batch_uuid)
            .ok_or_else(|| ProviderError::BatchNotReady(batch_uuid.to_string()))?;
        let parsed = batch
            .lines
            .into_iter()
            .map(|(custom_id, text)| {
                let mut p = ParsedResponse::new(text);
                p.custom_id = Some(custom_id);
                p
            })
            .collect::<Vec<_>>();
        Ok(vec![BatchResult {
            status: BatchStatus::Ready,
            raw_output: String::new(),
            parsed_responses: Some(parsed),
        }])
    }
}
