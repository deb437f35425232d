//! The execution strategy an [`crate::Agent`] was opened with, each
//! variant pairing a `llmgw-backend` backend with the one sub-trait of
//! [`llmgw_provider::ProviderAdapter`] it actually drives.
//!
//! The workspace pins `rust-version = "1.75"`, which predates trait
//! upcasting (stable since 1.86), so a [`Strategy`] cannot hold
//! `Arc<dyn SyncProviderAdapter>` and later upcast it to `&dyn
//! ProviderAdapter` when it only needs `provider_type`/`default_identity`.
//! [`ProviderInfo`] snapshots exactly those two fields at construction
//! time instead.

use std::sync::Arc;

use llmgw_backend::{AsyncBackend, BatchBackend, SyncBackend};
use llmgw_provider::{AsyncProviderAdapter, BatchProviderAdapter, ProviderAdapter, SyncProviderAdapter};
use llmgw_types::{LlmIdentity, Provider};

/// What [`crate::Agent::ask_llm_inner`] needs to know about the adapter
/// without holding a `&dyn ProviderAdapter`.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_type: String,
    pub default_identity: LlmIdentity,
}

impl ProviderInfo {
    fn snapshot(adapter: &dyn ProviderAdapter) -> Self {
        ProviderInfo {
            provider_type: adapter.provider_type().to_string(),
            default_identity: adapter.default_identity(),
        }
    }

    /// `true` iff `llm.provider` (when declared) names this adapter's
    /// own provider family — the fail-fast check in `askLLM` step 7.
    pub fn compatible_with(&self, llm: &LlmIdentity) -> bool {
        match &llm.provider {
            None => true,
            Some(provider) => provider.as_str() == self.provider_type,
        }
    }
}

/// One of the three execution strategies an agent dispatches through.
/// Constructed once when the gateway opens and shared read-only by every
/// agent thereafter.
pub enum Strategy {
    Sync {
        backend: SyncBackend,
        adapter: Arc<dyn SyncProviderAdapter>,
        info: ProviderInfo,
    },
    Async {
        backend: Arc<AsyncBackend>,
        adapter: Arc<dyn AsyncProviderAdapter>,
        info: ProviderInfo,
    },
    Batch {
        backend: BatchBackend,
        adapter: Arc<dyn BatchProviderAdapter>,
        info: ProviderInfo,
    },
}

impl Strategy {
    pub fn sync(backend: SyncBackend, adapter: Arc<dyn SyncProviderAdapter>) -> Self {
        let info = ProviderInfo::snapshot(adapter.as_ref());
        Strategy::Sync { backend, adapter, info }
    }

    pub fn async_(backend: Arc<AsyncBackend>, adapter: Arc<dyn AsyncProviderAdapter>) -> Self {
        let info = ProviderInfo::snapshot(adapter.as_ref());
        Strategy::Async { backend, adapter, info }
    }

    pub fn batch(backend: BatchBackend, adapter: Arc<dyn BatchProviderAdapter>) -> Self {
        let info = ProviderInfo::snapshot(adapter.as_ref());
        Strategy::Batch { backend, adapter, info }
    }

    pub fn info(&self) -> &ProviderInfo {
        match self {
            Strategy::Sync { info, .. } => info,
            Strategy::Async { info, .. } => info,
            Strategy::Batch { info, .. } => info,
        }
    }

    pub fn default_llm(&self) -> LlmIdentity {
        self.info().default_identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatible_when_llm_has_no_declared_provider() {
        let info = ProviderInfo {
            provider_type: "openai".into(),
            default_identity: LlmIdentity::resolve("gpt-4o", None),
        };
        let llm = LlmIdentity::resolve("anything", None);
        assert!(info.compatible_with(&llm));
    }

    #[test]
    fn incompatible_when_declared_provider_differs() {
        let info = ProviderInfo {
            provider_type: "openai".into(),
            default_identity: LlmIdentity::resolve("gpt-4o", None),
        };
        let llm = LlmIdentity::resolve("claude-sonnet-4-5", Some(Provider::Anthropic));
        assert!(!info.compatible_with(&llm));
    }
}
