//! Lazy and ready response handles.
//!
//! A [`ResponseHandle`] is either [`ResponseHandle::Ready`] — the
//! resolved value is already in hand, typically because `askLLM` served
//! it straight from the cache — or [`ResponseHandle::Pending`], which
//! carries only a [`CallIdentifier`] and a [`BackendHandle`] back
//! reference; [`ResponseHandle::resolve`] asks the backend, which may in
//! turn drain in-flight completions, and memoises the result.
//!
//! Neither variant can be `derive(Serialize)`'d directly: a `Pending`
//! handle closes over a `dyn BackendHandle`, which by design is not
//! serializable — this is how the `MessageState` ↔ `Agent` ↔ `Backend`
//! reference cycle gets broken. Pickling instead goes through
//! [`ResponseHandle::snapshot`], which keeps only the concise
//! `CallIdentifier`; a loader re-attaches a live backend with
//! [`ResponseHandle::from_snapshot`] to get a fresh `Pending` handle back.

pub mod error;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

pub use error::{Result, ResponseError};
use llmgw_types::{CallIdentifier, ParsedResponse, ToolArguments, ToolCall};

/// The backend-side half of a [`ResponseHandle::Pending`]: whatever
/// produced the call is asked to resolve it, without the handle needing
/// to know whether that means reading the datastore, draining an async
/// worker, or anything else.
#[async_trait]
pub trait BackendHandle: Send + Sync {
    async fn resolve(&self, cid: &CallIdentifier) -> Result<ParsedResponse>;
}

/// The concise, serializable form of a handle: just enough to look the
/// call back up once a backend is reattached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleSnapshot {
    pub cid: CallIdentifier,
}

pub struct ReadyResponse {
    cid: Option<CallIdentifier>,
    parsed: ParsedResponse,
}

impl ReadyResponse {
    pub fn new(parsed: ParsedResponse) -> Self {
        ReadyResponse { cid: None, parsed }
    }

    pub fn with_cid(parsed: ParsedResponse, cid: CallIdentifier) -> Self {
        ReadyResponse {
            cid: Some(cid),
            parsed,
        }
    }
}

pub struct PendingResponse {
    cid: CallIdentifier,
    backend: Arc<dyn BackendHandle>,
    memo: OnceCell<ParsedResponse>,
}

impl PendingResponse {
    pub fn new(cid: CallIdentifier, backend: Arc<dyn BackendHandle>) -> Self {
        PendingResponse {
            cid,
            backend,
            memo: OnceCell::new(),
        }
    }

    async fn resolved(&self) -> Result<&ParsedResponse> {
        self.memo
            .get_or_try_init(|| async { self.backend.resolve(&self.cid).await })
            .await
    }
}

/// A lazy or already-resolved response to one `askLLM` call.
pub enum ResponseHandle {
    Ready(ReadyResponse),
    Pending(PendingResponse),
}

impl ResponseHandle {
    pub fn ready(parsed: ParsedResponse) -> Self {
        ResponseHandle::Ready(ReadyResponse::new(parsed))
    }

    pub fn ready_with_cid(parsed: ParsedResponse, cid: CallIdentifier) -> Self {
        ResponseHandle::Ready(ReadyResponse::with_cid(parsed, cid))
    }

    pub fn pending(cid: CallIdentifier, backend: Arc<dyn BackendHandle>) -> Self {
        ResponseHandle::Pending(PendingResponse::new(cid, backend))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ResponseHandle::Ready(_))
    }

    /// The call identifier this handle resolves, if it has one — a
    /// `Ready` handle constructed directly from a value (not via a
    /// cache lookup) has none.
    pub fn cid(&self) -> Option<&CallIdentifier> {
        match self {
            ResponseHandle::Ready(r) => r.cid.as_ref(),
            ResponseHandle::Pending(p) => Some(&p.cid),
        }
    }

    /// The resolved value without awaiting anything — `None` for a
    /// `Pending` handle, resolved or not. Used by callers (e.g.
    /// `MessageState` snapshotting) that need synchronous access to an
    /// already-resolved value.
    pub fn ready_parsed(&self) -> Option<&ParsedResponse> {
        match self {
            ResponseHandle::Ready(r) => Some(&r.parsed),
            ResponseHandle::Pending(_) => None,
        }
    }

    async fn parsed(&self) -> Result<&ParsedResponse> {
        match self {
            ResponseHandle::Ready(r) => Ok(&r.parsed),
            ResponseHandle::Pending(p) => p.resolved().await,
        }
    }

    /// The resolved text.
    pub async fn resolve(&self) -> Result<String> {
        Ok(self.parsed().await?.text.clone())
    }

    /// The resolved text, parsed as JSON.
    pub async fn resolve_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.resolve().await?)?)
    }

    pub async fn resolve_function_calls(&self) -> Result<Vec<ToolCall>> {
        Ok(self.parsed().await?.function_calls.clone())
    }

    /// The full provider-neutral response, once resolved.
    pub async fn resolve_parsed(&self) -> Result<ParsedResponse> {
        Ok(self.parsed().await?.clone())
    }

    /// The concise, serializable form: just the `CallIdentifier`.
    /// `None` for a `Ready` handle with no originating CID — there is
    /// nothing to look back up.
    pub fn snapshot(&self) -> Option<HandleSnapshot> {
        self.cid().cloned().map(|cid| HandleSnapshot { cid })
    }

    /// Re-attaches a live backend to a snapshot taken in an earlier run,
    /// producing a fresh `Pending` handle.
    pub fn from_snapshot(snapshot: HandleSnapshot, backend: Arc<dyn BackendHandle>) -> Self {
        ResponseHandle::pending(snapshot.cid, backend)
    }
}

/// Casts a resolved handle back to the role-tagged document a provider
/// expects as prior conversation input: function-call variants are preserved rather than flattened
/// to text.
pub fn cast_to_document(parsed: &ParsedResponse) -> llmgw_types::Document {
    if parsed.function_calls.is_empty() {
        llmgw_types::Document::role(llmgw_types::Role::Assistant, parsed.text.clone())
    } else {
        llmgw_types::Document::FunctionCallRequest {
            prior_text: if parsed.text.is_empty() {
                None
            } else {
                Some(parsed.text.clone())
            },
            calls: parsed
                .function_calls
                .iter()
                .map(|c| ToolCall {
                    name: c.name.clone(),
                    arguments: match &c.arguments {
                        ToolArguments::Object(m) => ToolArguments::Object(m.clone()),
                        ToolArguments::Raw(s) => ToolArguments::Raw(s.clone()),
                    },
                    call_id: c.call_id.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl BackendHandle for CountingBackend {
        async fn resolve(&self, _cid: &CallIdentifier) -> Result<ParsedResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ParsedResponse::new("resolved"))
        }
    }

    #[tokio::test]
    async fn ready_handle_resolves_without_a_backend() {
        let handle = ResponseHandle::ready(ParsedResponse::new("cached"));
        assert_eq!(handle.resolve().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn pending_handle_memoises() {
        let backend = Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
        });
        let cid = CallIdentifier::new("a", "h", 0, 1);
        let handle = ResponseHandle::pending(cid, backend.clone());
        assert_eq!(handle.resolve().await.unwrap(), "resolved");
        assert_eq!(handle.resolve().await.unwrap(), "resolved");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_reattachment() {
        let backend = Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
        });
        let cid = CallIdentifier::new("a", "h", 0, 1);
        let handle = ResponseHandle::pending(cid.clone(), backend.clone());
        let snapshot = handle.snapshot().unwrap();
        assert_eq!(snapshot.cid, cid);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: HandleSnapshot = serde_json::from_str(&json).unwrap();
        let reattached = ResponseHandle::from_snapshot(restored, backend);
        assert_eq!(reattached.resolve().await.unwrap(), "resolved");
    }

    #[test]
    fn casting_preserves_function_calls() {
        let mut parsed = ParsedResponse::new("");
        parsed.function_calls.push(ToolCall {
            name: "lookup".into(),
            arguments: ToolArguments::Raw("{}".into()),
            call_id: "call-1".into(),
        });
        let doc = cast_to_document(&parsed);
        match doc {
            llmgw_types::Document::FunctionCallRequest { calls, .. } => assert_eq!(calls.len(), 1),
            other => panic!("expected FunctionCallRequest, got {other:?}"),
        }
    }
}
