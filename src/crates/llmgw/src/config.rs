//! [`GatewayConfig`]: the enumerated options the gateway factory
//! recognizes, deserializable from TOML or JSON via `serde`, built with
//! chained `with_x(self) -> Self` builder methods.

use serde::{Deserialize, Serialize};

fn default_strategy() -> Strategy {
    Strategy::Sync
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which execution backend an opened gateway dispatches every
/// `askLLM` call through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sync,
    Async,
    Batch,
}

/// Rolling-window rate limit applied to sync submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottlerConfig {
    pub max_requests: Option<u32>,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,
}

fn default_window_seconds() -> f64 {
    60.0
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        ThrottlerConfig {
            max_requests: None,
            window_seconds: default_window_seconds(),
        }
    }
}

/// Execution-strategy-specific tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweaks {
    #[serde(default = "default_async_max_concurrent")]
    pub async_max_concurrent: usize,
}

fn default_async_max_concurrent() -> usize {
    8
}

impl Default for Tweaks {
    fn default() -> Self {
        Tweaks {
            async_max_concurrent: default_async_max_concurrent(),
        }
    }
}

/// The gateway factory's full configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Working-directory path.
    pub directory: String,

    /// Declared provider family, if any; `None` defers to the adapter's
    /// own default identity.
    #[serde(default)]
    pub provider: Option<llmgw_types::Provider>,

    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    #[serde(default)]
    pub ignore_cache: bool,

    #[serde(default)]
    pub rewrite_cache: bool,

    #[serde(default)]
    pub user_confirmation: bool,

    #[serde(default)]
    pub throttler: ThrottlerConfig,

    #[serde(default)]
    pub tweaks: Tweaks,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl GatewayConfig {
    pub fn new(directory: impl Into<String>) -> Self {
        GatewayConfig {
            directory: directory.into(),
            provider: None,
            strategy: default_strategy(),
            ignore_cache: false,
            rewrite_cache: false,
            user_confirmation: false,
            throttler: ThrottlerConfig::default(),
            tweaks: Tweaks::default(),
            log_level: default_log_level(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_provider(mut self, provider: llmgw_types::Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_ignore_cache(mut self, ignore_cache: bool) -> Self {
        self.ignore_cache = ignore_cache;
        self
    }

    pub fn with_rewrite_cache(mut self, rewrite_cache: bool) -> Self {
        self.rewrite_cache = rewrite_cache;
        self
    }

    pub fn with_user_confirmation(mut self, user_confirmation: bool) -> Self {
        self.user_confirmation = user_confirmation;
        self
    }

    pub fn with_throttler(mut self, max_requests: Option<u32>, window_seconds: f64) -> Self {
        self.throttler = ThrottlerConfig {
            max_requests,
            window_seconds,
        };
        self
    }

    pub fn with_async_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.tweaks.async_max_concurrent = max_concurrent;
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    pub fn from_toml(text: &str) -> crate::error::GatewayResult<Self> {
        Ok(toml::from_str(text)?)
    }
}
