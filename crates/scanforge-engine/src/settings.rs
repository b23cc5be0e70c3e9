//! Engine settings.
//!
//! A [`Settings`] value is a read-only snapshot consumed at task-creation
//! time: the scanner command line is built against it when the task is
//! registered, so later settings changes never affect already-submitted
//! tasks.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default scanner rate limit (requests per second).
const DEFAULT_RATE_LIMIT: u32 = 50;

/// Default in-scanner template concurrency.
const DEFAULT_CONCURRENCY: u32 = 25;

/// Default termination grace period in seconds.
const DEFAULT_GRACE_SECS: u64 = 5;

/// Per-protocol proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub socks5: Option<String>,
}

impl ProxySettings {
    /// The proxy handed to the scanner when a task sets none of its own.
    /// Blank entries are treated as unset.
    pub fn preferred(&self) -> Option<&str> {
        non_blank(&self.http)
            .or_else(|| non_blank(&self.https))
            .or_else(|| non_blank(&self.socks5))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scanner executable, resolved via PATH or an absolute path.
    pub binary: String,

    /// Rate limit applied when a task does not set its own.
    pub default_rate_limit: u32,

    /// Concurrency applied when a task does not set its own.
    pub default_concurrency: u32,

    /// DNS-callback server applied when a task does not set its own.
    /// Empty means no out-of-band detection.
    pub interactsh_url: String,

    /// Proxy defaults per protocol.
    pub proxy: ProxySettings,

    /// Directory holding scan template files.
    pub templates_dir: PathBuf,

    /// Working directory for spawned scanner processes. None inherits the
    /// engine's own.
    pub working_dir: Option<PathBuf>,

    /// Seconds to wait after a termination signal before force-killing.
    pub grace_period_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binary: "nuclei".to_string(),
            default_rate_limit: DEFAULT_RATE_LIMIT,
            default_concurrency: DEFAULT_CONCURRENCY,
            interactsh_url: String::new(),
            proxy: ProxySettings::default(),
            templates_dir: config_dir().join("templates"),
            working_dir: None,
            grace_period_secs: DEFAULT_GRACE_SECS,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file does not exist. Missing keys take their default values.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Persist settings as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// The default settings file location.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.json")
    }

    /// Termination grace period as a [`Duration`].
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// DNS-callback default, None when unconfigured.
    pub fn interactsh_default(&self) -> Option<&str> {
        let trimmed = self.interactsh_url.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Per-user configuration directory.
fn config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".scanforge")
}
