//! The content model the hasher, provider adapters, and message state all
//! share.
//!
//! A [`Document`] is one turn of conversational input. Ordering of a
//! `Vec<Document>` is significant everywhere it appears: the hasher folds
//! documents in list order, and providers receive them in the same order
//! they were appended.
//!
//! ```
//! use llmgw_types::{Document, Role};
//!
//! let turn = Document::role(Role::User, "what's the weather?");
//! assert_eq!(turn.role_of(), Some(Role::User));
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Developer => "developer",
        }
    }
}

/// One invocation of a tool/function within a [`Document::FunctionCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: ToolArguments,
    pub call_id: String,
}

/// Tool arguments as either a structured object or an opaque raw string,
/// matching what providers actually hand back (some emit valid JSON
/// objects, some emit a string that is itself JSON-encoded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Object(serde_json::Map<String, serde_json::Value>),
    Raw(String),
}

impl ToolArguments {
    /// Bytes fed to the hasher: the object's canonical JSON bytes, or the
    /// raw string's bytes.
    pub fn hash_bytes(&self) -> Vec<u8> {
        match self {
            ToolArguments::Object(map) => serde_json::to_vec(map).unwrap_or_default(),
            ToolArguments::Raw(s) => s.as_bytes().to_vec(),
        }
    }
}

/// One turn of conversational content.
///
/// Image bytes participate in the doc hash directly: callers are
/// responsible for handing over already-encoded bytes (PNG, JPEG,
/// whatever the provider expects) — this crate does no format sniffing or
/// conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Document {
    /// Untagged plain text, no role.
    Text { content: String },
    /// Role-tagged text.
    RoleText { role: Role, content: String },
    /// Encoded image bytes plus their media type (e.g. `"image/png"`).
    Image {
        bytes: Vec<u8>,
        media_type: String,
    },
    /// A request to call one or more tools, with any text that preceded
    /// the call.
    FunctionCallRequest {
        prior_text: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// The result of a previously requested tool call.
    FunctionCallOutput { call_id: String, content: String },
}

impl Document {
    pub fn text(content: impl Into<String>) -> Self {
        Document::Text {
            content: content.into(),
        }
    }

    pub fn role(role: Role, content: impl Into<String>) -> Self {
        Document::RoleText {
            role,
            content: content.into(),
        }
    }

    pub fn image(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Document::Image {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Returns the tagged role, if any.
    pub fn role_of(&self) -> Option<Role> {
        match self {
            Document::RoleText { role, .. } => Some(*role),
            _ => None,
        }
    }
}
