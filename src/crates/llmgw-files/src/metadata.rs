//! `metadata.json`: session counter plus per-agent `WorkingMetadata`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use llmgw_types::WorkingMetadata;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    #[serde(default)]
    pub session_counter: u64,
    #[serde(default)]
    pub agents: HashMap<String, WorkingMetadata>,
}

impl DirectoryMetadata {
    /// Loads `metadata.json` from `path` if present, otherwise starts
    /// fresh. A missing or malformed file is not fatal — the gateway is
    /// allowed to cold-start against an empty directory.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => DirectoryMetadata::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn agent(&self, name: &str) -> WorkingMetadata {
        self.agents.get(name).cloned().unwrap_or_default()
    }

    pub fn set_agent(&mut self, name: impl Into<String>, metadata: WorkingMetadata) {
        self.agents.insert(name.into(), metadata);
    }
}
