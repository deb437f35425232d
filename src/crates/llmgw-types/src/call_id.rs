use serde::{Deserialize, Serialize};

/// Auditing-only metadata attached to a [`CallIdentifier`]. Never
/// considered when comparing two identifiers for a cache-lookup match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CidMeta {
    pub provider_type: Option<String>,
    pub tag: Option<String>,
}

/// The replay-stable identity of one logical request.
///
/// Two identifiers "match" for cache purposes iff `agent_name`,
/// `doc_hash`, and `seq_id` are equal — see [`CallIdentifier::matches`].
/// `session_id` exists purely for auditing and is deliberately excluded
/// from that comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallIdentifier {
    pub agent_name: String,
    pub doc_hash: String,
    pub seq_id: u64,
    pub session_id: u64,
    pub meta: CidMeta,
}

impl CallIdentifier {
    pub fn new(agent_name: impl Into<String>, doc_hash: impl Into<String>, seq_id: u64, session_id: u64) -> Self {
        CallIdentifier {
            agent_name: agent_name.into(),
            doc_hash: doc_hash.into(),
            seq_id,
            session_id,
            meta: CidMeta::default(),
        }
    }

    pub fn with_meta(mut self, provider_type: Option<String>, tag: Option<String>) -> Self {
        self.meta = CidMeta { provider_type, tag };
        self
    }

    /// The comparison used everywhere cache lookups, live-task tracking,
    /// and pending-batch checks need to know "is this the same logical
    /// call", regardless of which session produced it.
    pub fn matches(&self, other: &CallIdentifier) -> bool {
        self.agent_name == other.agent_name
            && self.doc_hash == other.doc_hash
            && self.seq_id == other.seq_id
    }

    /// `<agent_name>-<checkpoint_or_empty>-<session_id>-<seq_id>`, the
    /// wire-visible custom-id used for batch line bookkeeping. Must
    /// round-trip to this CID: see [`CallIdentifier::parse_custom_id`].
    pub fn custom_id(&self, checkpoint: Option<&str>) -> String {
        format!(
            "{}-{}-{}-{}",
            self.agent_name,
            checkpoint.unwrap_or(""),
            self.session_id,
            self.seq_id
        )
    }

    /// Inverse of [`CallIdentifier::custom_id`]. `doc_hash` and `meta`
    /// cannot be recovered from the custom-id alone (they are not part of
    /// its format) and are left default; callers that need the full
    /// identifier look it up in `batch_pending` instead.
    pub fn parse_custom_id(custom_id: &str) -> Option<(String, Option<String>, u64, u64)> {
        let mut parts = custom_id.rsplitn(4, '-');
        let seq_id: u64 = parts.next()?.parse().ok()?;
        let session_id: u64 = parts.next()?.parse().ok()?;
        let checkpoint = parts.next()?;
        let agent_name = parts.next()?;
        let checkpoint = if checkpoint.is_empty() {
            None
        } else {
            Some(checkpoint.to_string())
        };
        Some((agent_name.to_string(), checkpoint, session_id, seq_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_ignores_session_id() {
        let a = CallIdentifier::new("agent", "hash", 3, 1);
        let b = CallIdentifier::new("agent", "hash", 3, 2);
        assert!(a.matches(&b));
    }

    #[test]
    fn match_requires_agent_hash_and_seq() {
        let a = CallIdentifier::new("agent", "hash", 3, 1);
        let b = CallIdentifier::new("agent", "hash", 4, 1);
        assert!(!a.matches(&b));
    }

    #[test]
    fn custom_id_round_trips() {
        let cid = CallIdentifier::new("a", "h", 7, 42);
        let custom = cid.custom_id(Some("chk"));
        assert_eq!(custom, "a-chk-42-7");
        let (agent_name, checkpoint, session_id, seq_id) =
            CallIdentifier::parse_custom_id(&custom).unwrap();
        assert_eq!(agent_name, "a");
        assert_eq!(checkpoint.as_deref(), Some("chk"));
        assert_eq!(session_id, 42);
        assert_eq!(seq_id, 7);
    }

    #[test]
    fn custom_id_round_trips_without_checkpoint() {
        let cid = CallIdentifier::new("a", "h", 0, 0);
        let custom = cid.custom_id(None);
        assert_eq!(custom, "a--0-0");
        let (agent_name, checkpoint, ..) = CallIdentifier::parse_custom_id(&custom).unwrap();
        assert_eq!(agent_name, "a");
        assert_eq!(checkpoint, None);
    }
}
