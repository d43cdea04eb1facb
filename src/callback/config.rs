//! Event Capture Configuration
//!
//! Settings that control where event records go and what they contain,
//! loaded from several sources with the usual precedence:
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (TOML, YAML, or JSON)
//! 3. Environment variables
//! 4. Explicit overrides (highest priority)
//!
//! # Configuration File Format (TOML)
//!
//! ```toml
//! [events]
//! # Output destination: "stdout", "stderr", or file path
//! output = "stdout"
//!
//! # Output style composed with event capture: "default" or "minimal"
//! style = "default"
//!
//! # Render task arguments into `task_args`
//! display_args_to_stdout = true
//!
//! # Results larger than this (serialized) are dropped from records
//! max_event_res = 700000
//!
//! # Width of base64 chunks on the wire
//! chunk_width = 78
//!
//! # Where `artifacts/custom` is written for set_stats data
//! private_data_dir = "/tmp/awx_42_abcd"
//!
//! [events.job_ids]
//! job_id = 42
//! ```
//!
//! # Environment Variables
//!
//! - `RUSTIBLE_EVENTS_OUTPUT` - Output destination
//! - `RUSTIBLE_EVENTS_STYLE` - Output style
//! - `RUSTIBLE_EVENTS_DISPLAY_ARGS` - Render task arguments (true/false)
//! - `RUSTIBLE_EVENTS_CHUNK_WIDTH` - Base64 chunk width
//! - `RUSTIBLE_EVENTS_NO_COLOR` / `NO_COLOR` - Disable colors
//! - `MAX_EVENT_RES` - Result size limit
//! - `AWX_PRIVATE_DATA_DIR` - Artifact directory root
//! - `JOB_ID`, `AD_HOC_COMMAND_ID`, `PROJECT_UPDATE_ID`, `INVENTORY_UPDATE_ID`

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default size limit for a serialized `res` payload.
pub const DEFAULT_MAX_EVENT_RES: usize = 700_000;

/// Default width of a base64 chunk on the wire.
pub const DEFAULT_CHUNK_WIDTH: usize = 78;

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Output style composed with event capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStyle {
    /// Ansible-like banners and per-host lines
    #[default]
    Default,
    /// Failures and unreachable hosts only
    Minimal,
}

impl std::str::FromStr for OutputStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(OutputStyle::Default),
            "minimal" => Ok(OutputStyle::Minimal),
            other => Err(format!("unknown output style '{}'", other)),
        }
    }
}

/// Identifiers of the job that owns this run, stamped into every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobIds {
    pub job_id: Option<i64>,
    pub ad_hoc_command_id: Option<i64>,
    pub project_update_id: Option<i64>,
    pub inventory_update_id: Option<i64>,
}

impl JobIds {
    /// Non-empty identifiers as `(field, value)` pairs.
    pub fn fields(&self) -> Vec<(&'static str, i64)> {
        [
            ("job_id", self.job_id),
            ("ad_hoc_command_id", self.ad_hoc_command_id),
            ("project_update_id", self.project_update_id),
            ("inventory_update_id", self.inventory_update_id),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }

    fn merge(&mut self, other: &JobIds) {
        if other.job_id.is_some() {
            self.job_id = other.job_id;
        }
        if other.ad_hoc_command_id.is_some() {
            self.ad_hoc_command_id = other.ad_hoc_command_id;
        }
        if other.project_update_id.is_some() {
            self.project_update_id = other.project_update_id;
        }
        if other.inventory_update_id.is_some() {
            self.inventory_update_id = other.inventory_update_id;
        }
    }
}

/// Main event capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Output destination: "stdout", "stderr", or a file path
    pub output: String,

    /// Output style composed with event capture
    pub style: OutputStyle,

    /// Whether to use colored display output
    pub use_colors: bool,

    /// Render task arguments into `task_args`
    pub display_args_to_stdout: bool,

    /// Serialized `res` payloads larger than this are replaced by `{}`
    pub max_event_res: usize,

    /// Width of base64 chunks on the wire
    pub chunk_width: usize,

    /// Root directory for run artifacts
    pub private_data_dir: Option<PathBuf>,

    /// Owning job identifiers
    pub job_ids: JobIds,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            output: "stdout".to_string(),
            style: OutputStyle::Default,
            use_colors: true,
            display_args_to_stdout: true,
            max_event_res: DEFAULT_MAX_EVENT_RES,
            chunk_width: DEFAULT_CHUNK_WIDTH,
            private_data_dir: None,
            job_ids: JobIds::default(),
        }
    }
}

impl EventsConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory that receives `custom` set_stats artifacts.
    pub fn artifacts_dir(&self) -> Option<PathBuf> {
        self.private_data_dir.as_ref().map(|d| d.join("artifacts"))
    }

    /// Check values that would corrupt the stream if accepted.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk_width == 0 {
            return Err(crate::error::Error::invalid_config(
                "chunk_width",
                "must be greater than zero",
            ));
        }
        if self.output.trim().is_empty() {
            return Err(crate::error::Error::invalid_config(
                "output",
                "must be 'stdout', 'stderr' or a file path",
            ));
        }
        Ok(())
    }

    /// Merge another configuration into this one (other takes precedence).
    pub fn merge(&mut self, other: EventsConfig) {
        let defaults = EventsConfig::default();
        if other.output != defaults.output {
            self.output = other.output;
        }
        if other.style != defaults.style {
            self.style = other.style;
        }
        if !other.use_colors {
            self.use_colors = false;
        }
        if !other.display_args_to_stdout {
            self.display_args_to_stdout = false;
        }
        if other.max_event_res != defaults.max_event_res {
            self.max_event_res = other.max_event_res;
        }
        if other.chunk_width != defaults.chunk_width {
            self.chunk_width = other.chunk_width;
        }
        if other.private_data_dir.is_some() {
            self.private_data_dir = other.private_data_dir;
        }
        self.job_ids.merge(&other.job_ids);
    }
}

// ============================================================================
// Configuration Loader
// ============================================================================

/// Builder for loading event configuration from multiple sources.
#[derive(Debug)]
pub struct EventsConfigLoader {
    /// Configuration files to load (in order)
    config_files: Vec<PathBuf>,
    /// Environment variable prefix
    env_prefix: Option<String>,
    /// Explicit overrides
    overrides: EventsConfig,
    /// Whether to load from standard locations
    load_standard_locations: bool,
}

impl Default for EventsConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EventsConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self {
            config_files: Vec::new(),
            env_prefix: Some("RUSTIBLE_EVENTS".to_string()),
            overrides: EventsConfig::default(),
            load_standard_locations: true,
        }
    }

    /// Add a configuration file to load.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Disable environment variable loading.
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Disable loading from standard configuration locations.
    pub fn without_standard_locations(mut self) -> Self {
        self.load_standard_locations = false;
        self
    }

    /// Override the output destination.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.overrides.output = output.into();
        self
    }

    /// Override the output style.
    pub fn with_style(mut self, style: OutputStyle) -> Self {
        self.overrides.style = style;
        self
    }

    /// Override color usage.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.overrides.use_colors = use_colors;
        self
    }

    /// Load configuration from all sources.
    pub fn load(self) -> Result<EventsConfig> {
        let mut config = EventsConfig::default();

        if self.load_standard_locations {
            for path in Self::standard_config_paths() {
                if path.exists() {
                    debug!("Loading events config from: {}", path.display());
                    match Self::load_file(&path) {
                        Ok(file_config) => config.merge(file_config),
                        Err(e) => warn!("Ignoring events config {}: {:#}", path.display(), e),
                    }
                }
            }
        }

        for path in &self.config_files {
            if path.exists() {
                debug!("Loading events config from: {}", path.display());
                let file_config = Self::load_file(path)
                    .with_context(|| format!("Failed to load config from: {}", path.display()))?;
                config.merge(file_config);
            } else {
                warn!("Events config file not found: {}", path.display());
            }
        }

        if let Some(prefix) = &self.env_prefix {
            config.merge(Self::load_from_env(prefix)?);
        }

        config.merge(self.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Get standard configuration file locations.
    fn standard_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/rustible/events.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("rustible/events.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".rustible/events.toml"));
        }

        paths.push(PathBuf::from(".rustible/events.toml"));
        paths
    }

    /// Load configuration from a file.
    fn load_file(path: &Path) -> Result<EventsConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let wrapper: EventsWrapper = match extension {
            "toml" => toml::from_str(&content)?,
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(wrapper.events)
    }

    /// Load configuration from environment variables.
    fn load_from_env(prefix: &str) -> Result<EventsConfig> {
        let mut config = EventsConfig::default();

        if let Ok(val) = env::var(format!("{}_OUTPUT", prefix)) {
            config.output = val;
        }

        if let Ok(val) = env::var(format!("{}_STYLE", prefix)) {
            config.style = val
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}_STYLE", prefix))?;
        }

        if let Ok(val) = env::var(format!("{}_DISPLAY_ARGS", prefix)) {
            config.display_args_to_stdout = parse_bool(&val);
        }

        if let Ok(val) = env::var(format!("{}_CHUNK_WIDTH", prefix)) {
            config.chunk_width = val
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}_CHUNK_WIDTH: {}", prefix, val))?;
        }

        if let Ok(val) = env::var(format!("{}_NO_COLOR", prefix)) {
            if parse_bool(&val) {
                config.use_colors = false;
            }
        }
        if env::var("NO_COLOR").is_ok() {
            config.use_colors = false;
        }

        if let Ok(val) = env::var("MAX_EVENT_RES") {
            config.max_event_res = val
                .trim()
                .parse()
                .with_context(|| format!("Invalid MAX_EVENT_RES: {}", val))?;
        }

        if let Ok(val) = env::var("AWX_PRIVATE_DATA_DIR") {
            if !val.is_empty() {
                config.private_data_dir = Some(PathBuf::from(val));
            }
        }

        config.job_ids = JobIds {
            job_id: env_id("JOB_ID")?,
            ad_hoc_command_id: env_id("AD_HOC_COMMAND_ID")?,
            project_update_id: env_id("PROJECT_UPDATE_ID")?,
            inventory_update_id: env_id("INVENTORY_UPDATE_ID")?,
        };

        Ok(config)
    }
}

fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn env_id(name: &str) -> Result<Option<i64>> {
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid {}: {}", name, val)),
        _ => Ok(None),
    }
}

/// Wrapper for the `[events]` table.
#[derive(Debug, Deserialize)]
struct EventsWrapper {
    #[serde(default)]
    events: EventsConfig,
}
