use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default remote object names per stock group, appended to `storage.base_url`
/// when a group does not list explicit sources.
const DEFAULT_LIGHTHOUSE_OBJECTS: &[&str] = &[
    "lighthouse/scans-eu.sqlite",
    "lighthouse/scans-us.sqlite",
    "lighthouse/scans-apac.sqlite",
];
const DEFAULT_VISUAL_OBJECTS: &[&str] = &["visual/results-eu.sqlite", "visual/results-us.sqlite"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Seconds between automatic refresh cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Directory holding merged databases and the download scratch area.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_interval_secs() -> u64 {
    15 * 60
}

fn default_data_dir() -> PathBuf {
    std::env::temp_dir().join("pagepulse")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Base URL of the object store the default source lists hang off.
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GroupConfig {
    pub name: String,
    /// Explicit source URLs. Empty means "derive from storage.base_url".
    #[serde(default)]
    pub sources: Vec<String>,
    /// Table served by the group's `/data` endpoint (lighthouse-style groups).
    #[serde(default)]
    pub primary_table: Option<String>,
    /// Table served by `/api/baseline/data` (visual-style groups).
    #[serde(default)]
    pub baseline_table: Option<String>,
}

impl GroupConfig {
    /// Resolve the source URL list for one refresh cycle.
    ///
    /// Priority: `PAGEPULSE_<GROUP>_SOURCES` (comma-separated), then the
    /// configured `sources` list, then the built-in defaults joined onto
    /// `storage.base_url`.
    pub fn resolved_sources(&self, storage: &StorageConfig) -> Vec<String> {
        let env_key = format!("PAGEPULSE_{}_SOURCES", self.name.to_uppercase());
        if let Ok(raw) = std::env::var(&env_key) {
            return raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if !self.sources.is_empty() {
            return self.sources.clone();
        }

        if storage.base_url.is_empty() {
            return Vec::new();
        }

        let base = storage.base_url.trim_end_matches('/');
        let objects: &[&str] = match self.name.as_str() {
            "lighthouse" => DEFAULT_LIGHTHOUSE_OBJECTS,
            "visual" => DEFAULT_VISUAL_OBJECTS,
            _ => &[],
        };
        objects.iter().map(|o| format!("{}/{}", base, o)).collect()
    }
}

fn default_groups() -> Vec<GroupConfig> {
    vec![
        GroupConfig {
            name: "lighthouse".to_string(),
            sources: Vec::new(),
            primary_table: Some("reports".to_string()),
            baseline_table: None,
        },
        GroupConfig {
            name: "visual".to_string(),
            sources: Vec::new(),
            primary_table: None,
            baseline_table: Some("baselines".to_string()),
        },
    ]
}

impl Config {
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            refresh: RefreshConfig::default(),
            storage: StorageConfig::default(),
            groups: default_groups(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.refresh.interval_secs == 0 {
        anyhow::bail!("refresh.interval_secs must be >= 1");
    }

    if config.groups.is_empty() {
        anyhow::bail!("at least one [[groups]] entry is required");
    }

    for group in &config.groups {
        if group.name.is_empty() {
            anyhow::bail!("group names must not be empty");
        }
        let dupes = config
            .groups
            .iter()
            .filter(|g| g.name == group.name)
            .count();
        if dupes > 1 {
            anyhow::bail!("duplicate group name: '{}'", group.name);
        }
    }

    Ok(())
}
