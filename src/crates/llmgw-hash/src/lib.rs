//! Content-addressed fingerprint over an agent's instructions and
//! documents.
//!
//! `compute_doc_hash` folds a SHA-256 digest over, in order: the
//! instructions (if any), each document (type-tagged where the type
//! itself is ambiguous otherwise), then any salt terms. Equal inputs
//! always produce equal output; changing content, order, or salt changes
//! it. See [`compute_doc_hash`] for the exact byte layout.

use sha2::{Digest, Sha256};
use thiserror::Error;

use llmgw_types::{Document, Instructions, ToolCall};

pub type Result<T> = std::result::Result<T, HashError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("hashing encountered an unsupported document variant: {0}")]
    InvalidDocument(String),
}

/// 256-bit digest, hex-encoded. Deliberately opaque: callers compare and
/// store it, never decompose it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DocHash(pub String);

impl std::fmt::Display for DocHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_tool_call(hasher: &mut Sha256, call: &ToolCall) {
    hasher.update(call.name.as_bytes());
    hasher.update(call.arguments.hash_bytes());
    hasher.update(call.call_id.as_bytes());
}

fn hash_document(hasher: &mut Sha256, doc: &Document) -> Result<()> {
    match doc {
        Document::Text { content } => {
            hasher.update(content.as_bytes());
        }
        Document::RoleText { role, content } => {
            hasher.update(role.as_str().as_bytes());
            hasher.update(content.as_bytes());
        }
        // Encoded bytes participate directly; the caller already chose
        // the encoding (PNG, JPEG, ...), we do no sniffing or conversion.
        Document::Image { bytes, .. } => {
            hasher.update(bytes);
        }
        Document::FunctionCallRequest { prior_text, calls } => {
            hasher.update(b"function_call");
            if let Some(text) = prior_text {
                hasher.update(text.as_bytes());
            }
            for call in calls {
                hash_tool_call(hasher, call);
            }
        }
        Document::FunctionCallOutput { call_id, content } => {
            hasher.update(b"function_call_output");
            hasher.update(content.as_bytes());
            hasher.update(call_id.as_bytes());
        }
    }
    Ok(())
}

/// Computes the doc-hash over `instructions`, `documents` (in order), and
/// `salt_terms` (in order, appended last — this is where an explicit
/// `salt` argument or the `llm` identity, when requested via `hashBy`,
/// gets folded in by callers upstream).
///
/// `Document` is a closed enum in this workspace, so every variant is
/// presently hashable; `HashError::InvalidDocument` exists for parity
/// with provider adapters that may someday need to reject a variant they
/// cannot encode, and so the signature stays stable if that happens.
pub fn compute_doc_hash(
    instructions: &Instructions,
    documents: &[Document],
    salt_terms: &[String],
) -> Result<DocHash> {
    let mut hasher = Sha256::new();
    if let Some(instructions) = instructions {
        hasher.update(instructions.as_bytes());
    }
    for doc in documents {
        hash_document(&mut hasher, doc)?;
    }
    for term in salt_terms {
        hasher.update(term.as_bytes());
    }
    let digest = hasher.finalize();
    Ok(DocHash(hex_encode(&digest)))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{:02x}", b).expect("writing to a String never fails");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgw_types::Role;

    fn docs(texts: &[&str]) -> Vec<Document> {
        texts.iter().map(|t| Document::text(*t)).collect()
    }

    #[test]
    fn hash_is_pure() {
        let a = compute_doc_hash(&Some("sys".into()), &docs(&["a", "b"]), &[]).unwrap();
        let b = compute_doc_hash(&Some("sys".into()), &docs(&["a", "b"]), &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn order_changes_hash() {
        let forward = compute_doc_hash(&None, &docs(&["a", "b"]), &[]).unwrap();
        let backward = compute_doc_hash(&None, &docs(&["b", "a"]), &[]).unwrap();
        assert_ne!(forward, backward);
    }

    #[test]
    fn salt_changes_hash() {
        let unsalted = compute_doc_hash(&None, &docs(&["a"]), &[]).unwrap();
        let salted =
            compute_doc_hash(&None, &docs(&["a"]), &["gpt-4o-mini".to_string()]).unwrap();
        assert_ne!(unsalted, salted);
    }

    #[test]
    fn role_participates_in_hash() {
        let user = compute_doc_hash(&None, &[Document::role(Role::User, "hi")], &[]).unwrap();
        let assistant =
            compute_doc_hash(&None, &[Document::role(Role::Assistant, "hi")], &[]).unwrap();
        assert_ne!(user, assistant);
    }

    proptest::proptest! {
        #[test]
        fn never_panics_on_arbitrary_text(a in ".*", b in ".*") {
            let _ = compute_doc_hash(&None, &docs(&[a.as_str(), b.as_str()]), &[]).unwrap();
        }
    }
}
