//! [`MessageState`]: an ordered conversation container that is itself
//! askable, built on top of a plain list of documents and handles.

use std::sync::Arc;

use llmgw_response::cast_to_document;
use llmgw_types::Document;

use crate::{AskOptions, AskOutcome, Askable};

/// One entry in a [`MessageState`]: either a document the caller appended
/// directly, or a handle returned by a previous `ask_llm` call.
#[derive(Clone)]
pub enum MessageItem {
    Document(Document),
    Response(Arc<ResponseHandleWrapper>),
}

/// Wraps [`llmgw_response::ResponseHandle`] in an `Arc` so a
/// [`MessageState`] can clone its item list (e.g. when snapshotting)
/// without requiring the handle itself to be `Clone`.
pub struct ResponseHandleWrapper {
    pub handle: crate::ResponseHandle,
    /// `seq_id` recovered from the handle's call identifier, used only to
    /// fast-forward `anon_ctr` on mutation — see
    /// [`MessageState::recover_counter`].
    pub seq_id: Option<u64>,
}

/// The ordered, askable conversation container.
///
/// `anon_ctr`/`chkp_ctr` here are *not* the agent's authoritative
/// counters — they exist only so that, after unpickling and re-binding to
/// a fresh agent, the container can report the high-water mark it last
/// saw. The agent's own persisted `WorkingMetadata` remains the source of
/// truth for replay.
pub struct MessageState {
    pub agent_name: Option<String>,
    anon_ctr: u64,
    chkp_ctr: u64,
    items: Vec<MessageItem>,
    agent: Option<Arc<dyn Askable>>,
}

impl MessageState {
    pub fn new(agent_name: Option<String>) -> Self {
        MessageState {
            agent_name,
            anon_ctr: 0,
            chkp_ctr: 0,
            items: Vec::new(),
            agent: None,
        }
    }

    /// Re-binds a live agent after loading a state whose `agent` reference
    /// was dropped on pickling.
    pub fn bind(&mut self, agent: Arc<dyn Askable>) {
        self.agent = Some(agent);
    }

    pub fn anon_ctr(&self) -> u64 {
        self.anon_ctr
    }

    pub fn chkp_ctr(&self) -> u64 {
        self.chkp_ctr
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MessageItem> {
        self.items.iter()
    }

    /// Fast-forwards the local recovery counter from a response's call
    /// identifier. Mirrors `_update_seq_counters`: only ever raises the
    /// high-water mark, never lowers it.
    fn recover_counter(&mut self, item: &MessageItem) {
        if let MessageItem::Response(wrapper) = item {
            if let Some(seq_id) = wrapper.seq_id {
                self.anon_ctr = self.anon_ctr.max(seq_id);
            }
        }
    }

    pub fn push_document(&mut self, doc: Document) {
        let item = MessageItem::Document(doc);
        self.recover_counter(&item);
        self.items.push(item);
    }

    pub fn push_response(&mut self, handle: crate::ResponseHandle, seq_id: Option<u64>) {
        let item = MessageItem::Response(Arc::new(ResponseHandleWrapper { handle, seq_id }));
        self.recover_counter(&item);
        self.items.push(item);
    }

    pub fn extend_documents(&mut self, docs: impl IntoIterator<Item = Document>) {
        for doc in docs {
            self.push_document(doc);
        }
    }

    /// Casts the accumulated items to documents suitable as provider
    /// input: any embedded response handle is converted back to a
    /// role-tagged document (function-call variants preserved),
    /// everything else passes through unchanged.
    pub fn cast_documents(&self) -> Vec<Document> {
        self.items
            .iter()
            .map(|item| match item {
                MessageItem::Document(doc) => doc.clone(),
                MessageItem::Response(wrapper) => wrapper
                    .handle
                    .ready_parsed()
                    .map(cast_to_document)
                    .unwrap_or_else(|| {
                        // A still-pending handle has no resolved value yet;
                        // callers that reach this path with unresolved
                        // handles are expected to have awaited them first.
                        Document::role(llmgw_types::Role::Assistant, "")
                    }),
            })
            .collect()
    }

    /// Appends `docs`, asks the bound agent with the whole accumulated
    /// list cast to documents, and appends the resulting handle.
    pub async fn ask_llm(
        &mut self,
        docs: Vec<Document>,
        opts: AskOptions,
    ) -> AskOutcome<crate::ResponseHandle> {
        self.extend_documents(docs);
        let agent = self
            .agent
            .clone()
            .expect("MessageState::ask_llm called before bind()");
        let (handle, meta) = agent.ask_llm(self.cast_documents(), opts).await?;
        if meta.used_checkpoint {
            self.chkp_ctr = self.chkp_ctr.max(meta.seq_id + 1);
        } else {
            self.anon_ctr = self.anon_ctr.max(meta.seq_id + 1);
        }
        self.push_response(
            crate::ResponseHandle::ready(
                handle
                    .ready_parsed()
                    .cloned()
                    .unwrap_or_else(|| llmgw_types::ParsedResponse::new("")),
            ),
            Some(meta.seq_id),
        );
        Ok(handle)
    }

    /// Persists this state under the bound agent's name, if one is
    /// attached. A no-op otherwise.
    pub fn persist_marker(&self) -> Option<&str> {
        self.agent_name.as_deref()
    }

    /// The concise, serializable form of this container: each [`MessageItem::Response`] keeps only its
    /// [`llmgw_response::HandleSnapshot`] (or `None` if it never had a
    /// CID to snapshot), each [`MessageItem::Document`] passes through
    /// whole. The bound `agent` reference — not serializable, since it
    /// closes over `dyn Askable` — is dropped; [`MessageState::from_snapshot`]
    /// re-binds a live one.
    pub fn to_snapshot(&self) -> MessageSnapshot {
        MessageSnapshot {
            agent_name: self.agent_name.clone(),
            anon_ctr: self.anon_ctr,
            chkp_ctr: self.chkp_ctr,
            items: self
                .items
                .iter()
                .map(|item| match item {
                    MessageItem::Document(doc) => SnapshotItem::Document(doc.clone()),
                    MessageItem::Response(wrapper) => SnapshotItem::Response {
                        handle: wrapper.handle.snapshot(),
                        seq_id: wrapper.seq_id,
                    },
                })
                .collect(),
        }
    }

    /// Rebuilds a [`MessageState`] from a [`MessageSnapshot`], re-attaching
    /// `backend` to every response item that had a CID to resolve through.
    /// Call [`MessageState::bind`] afterwards to attach a live agent.
    pub fn from_snapshot(
        snapshot: MessageSnapshot,
        backend: Arc<dyn llmgw_response::BackendHandle>,
    ) -> Self {
        let items = snapshot
            .items
            .into_iter()
            .map(|item| match item {
                SnapshotItem::Document(doc) => MessageItem::Document(doc),
                SnapshotItem::Response { handle, seq_id } => {
                    let handle = match handle {
                        Some(snap) => crate::ResponseHandle::from_snapshot(snap, backend.clone()),
                        None => crate::ResponseHandle::ready(llmgw_types::ParsedResponse::new("")),
                    };
                    MessageItem::Response(Arc::new(ResponseHandleWrapper { handle, seq_id }))
                }
            })
            .collect();

        MessageState {
            agent_name: snapshot.agent_name,
            anon_ctr: snapshot.anon_ctr,
            chkp_ctr: snapshot.chkp_ctr,
            items,
            agent: None,
        }
    }
}

/// The pickle-safe form of a [`MessageState`]: plain
/// data, no `dyn Askable`/`dyn BackendHandle` references.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageSnapshot {
    pub agent_name: Option<String>,
    pub anon_ctr: u64,
    pub chkp_ctr: u64,
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum SnapshotItem {
    Document(Document),
    Response {
        handle: Option<llmgw_response::HandleSnapshot>,
        seq_id: Option<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_types::ParsedResponse;

    #[test]
    fn counters_start_at_zero() {
        let state = MessageState::new(Some("a".into()));
        assert_eq!(state.anon_ctr(), 0);
        assert_eq!(state.chkp_ctr(), 0);
    }

    #[test]
    fn push_response_recovers_counter() {
        let mut state = MessageState::new(None);
        state.push_response(
            crate::ResponseHandle::ready(ParsedResponse::new("hi")),
            Some(3),
        );
        assert_eq!(state.anon_ctr(), 3);
        state.push_response(
            crate::ResponseHandle::ready(ParsedResponse::new("hi")),
            Some(1),
        );
        assert_eq!(state.anon_ctr(), 3, "counter must never decrease");
    }

    #[test]
    fn cast_documents_preserves_plain_text() {
        let mut state = MessageState::new(None);
        state.push_document(Document::text("hello"));
        let cast = state.cast_documents();
        assert_eq!(cast.len(), 1);
        assert_eq!(cast[0], Document::text("hello"));
    }

    #[test]
    fn cast_documents_converts_ready_response_to_assistant_turn() {
        let mut state = MessageState::new(None);
        state.push_response(
            crate::ResponseHandle::ready(ParsedResponse::new("the answer")),
            Some(0),
        );
        let cast = state.cast_documents();
        assert_eq!(cast.len(), 1);
        assert_eq!(cast[0].role_of(), Some(llmgw_types::Role::Assistant));
    }
}
