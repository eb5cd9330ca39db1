//! Configuration for the weaver pipeline
//!
//! Loaded from a YAML file; every section and field has a default so a
//! partial (or absent) config file is always usable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// The eight predefined relation labels, in vocabulary order.
pub const PREDEFINED_RELATIONS: [&str; 8] = [
    "支撑观点",
    "反驳观点",
    "举例说明",
    "定义概念",
    "属于分类",
    "包含部分",
    "引出主题",
    "简单提及",
];

/// Fallback relation label returned by the offline (mock) oracle.
pub const FALLBACK_RELATION: &str = "简单提及";

/// Oracle (inference backend) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Provider name: "openai", "deepseek", or "mock" (explicit offline mode)
    pub provider: String,
    /// Model to request from the provider
    pub model: String,
    /// API key; unset for the mock provider
    pub api_key: Option<String>,
    /// Base URL override; provider default when unset
    pub base_url: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-call timeout in seconds; a timed-out call counts as a failure
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.1,
            timeout_secs: 30,
        }
    }
}

/// Relation vocabulary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// The predefined relation labels
    pub predefined: Vec<String>,
    /// Additional labels accepted from the oracle
    pub custom: Vec<String>,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            predefined: PREDEFINED_RELATIONS.iter().map(|s| s.to_string()).collect(),
            custom: Vec::new(),
        }
    }
}

impl RelationConfig {
    /// Full vocabulary in order: predefined labels followed by custom ones.
    pub fn vocabulary(&self) -> Vec<String> {
        self.predefined
            .iter()
            .chain(self.custom.iter())
            .cloned()
            .collect()
    }
}

/// Vault scanning and watching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// File extensions eligible for processing (with leading dot)
    pub watch_extensions: Vec<String>,
    /// Characters of context captured around an extraction site
    pub context_window: usize,
    /// Substring patterns that exclude a path from processing
    pub ignore_patterns: Vec<String>,
    /// Folders processed by the `config-folders` command
    pub folders_to_scan: Vec<PathBuf>,
    /// Minimum interval between accepted file-change events
    pub debounce_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            watch_extensions: vec![".md".to_string()],
            context_window: 100,
            ignore_patterns: vec!["/.git/".to_string(), "/.obsidian/".to_string()],
            folders_to_scan: Vec::new(),
            debounce_secs: 2,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    pub oracle: OracleConfig,
    pub relations: RelationConfig,
    pub vault: VaultConfig,
    /// Create a sibling `.bak` file before the first mutation of a pass
    pub backup_files: bool,
    /// Knowledge graph snapshot location; a platform data dir when unset
    pub graph_path: Option<PathBuf>,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            relations: RelationConfig::default(),
            vault: VaultConfig::default(),
            backup_files: true,
            graph_path: None,
        }
    }
}

impl WeaverConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing, unreadable, or invalid file yields the defaults with a
    /// warning; startup never fails on configuration problems.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Write a starter config file with all defaults spelled out.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let config = Self::default();
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, yaml)
    }

    /// Resolve the graph snapshot path, falling back to the platform data dir.
    pub fn resolved_graph_path(&self) -> PathBuf {
        if let Some(ref path) = self.graph_path {
            return path.clone();
        }
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
        data_dir.join("weaver").join("knowledge_graph.json")
    }

    /// Default config file location (`<config dir>/weaver/config.yaml`).
    pub fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
        config_dir.join("weaver").join("config.yaml")
    }
}
