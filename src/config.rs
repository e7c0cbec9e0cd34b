//! Runtime configuration for nodetracer.
//!
//! [`Settings`] is the process-wide default used by [`crate::Tracer::from_settings`].
//! Settings can be built in code, read from `NODETRACER_*` environment variables, or
//! a mix of both, and are installed with [`configure`].

use crate::error::{NodetracerError, Result};
use crate::storage::{FileStore, MemoryStore, StorageBackend};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

pub const ENV_CAPTURE_LEVEL: &str = "NODETRACER_CAPTURE_LEVEL";
pub const ENV_STORAGE: &str = "NODETRACER_STORAGE";
pub const ENV_REDACT_PATTERNS: &str = "NODETRACER_REDACT_PATTERNS";
pub const ENV_MAX_OUTPUT_SIZE: &str = "NODETRACER_MAX_OUTPUT_SIZE";

const FILE_SCHEME: &str = "file://";

/// How much of each span's payload is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureLevel {
    /// Structure, status and error message only
    Minimal,
    /// Adds input and output payloads
    Standard,
    /// Adds error tracebacks
    #[default]
    Full,
}

impl CaptureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureLevel::Minimal => "minimal",
            CaptureLevel::Standard => "standard",
            CaptureLevel::Full => "full",
        }
    }

    pub fn records_payloads(&self) -> bool {
        !matches!(self, CaptureLevel::Minimal)
    }

    pub fn records_tracebacks(&self) -> bool {
        matches!(self, CaptureLevel::Full)
    }
}

impl FromStr for CaptureLevel {
    type Err = NodetracerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(CaptureLevel::Minimal),
            "standard" => Ok(CaptureLevel::Standard),
            "full" => Ok(CaptureLevel::Full),
            other => Err(NodetracerError::ConfigError(format!(
                "Unsupported capture level {:?}. Use 'minimal', 'standard' or 'full'.",
                other
            ))),
        }
    }
}

impl fmt::Display for CaptureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global runtime configuration
#[derive(Clone)]
pub struct Settings {
    pub capture_level: CaptureLevel,
    pub storage: Arc<dyn StorageBackend>,
    /// Regexes matched against payload keys whose values are redacted
    pub redact_patterns: Vec<String>,
    /// Maximum characters kept for string values in `output_data`
    pub max_output_size: Option<usize>,
}

impl Settings {
    pub fn with_capture_level(mut self, capture_level: CaptureLevel) -> Self {
        self.capture_level = capture_level;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = storage;
        self
    }

    /// Resolve storage from a shorthand such as `memory` or `file://<path>`
    pub fn with_storage_shorthand(mut self, shorthand: &str) -> Result<Self> {
        self.storage = resolve_storage(shorthand)?;
        Ok(self)
    }

    pub fn with_redact_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redact_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_output_size(mut self, max_output_size: Option<usize>) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    /// Build settings from the `NODETRACER_*` environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(level) = lookup(ENV_CAPTURE_LEVEL) {
            settings.capture_level = level.parse()?;
        }
        if let Some(storage) = lookup(ENV_STORAGE) {
            settings = settings.with_storage_shorthand(&storage)?;
        }
        if let Some(patterns) = lookup(ENV_REDACT_PATTERNS) {
            settings.redact_patterns = patterns
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(size) = lookup(ENV_MAX_OUTPUT_SIZE) {
            let size = size.trim().parse::<usize>().map_err(|e| {
                NodetracerError::ConfigError(format!("{} must be an integer: {}", ENV_MAX_OUTPUT_SIZE, e))
            })?;
            settings.max_output_size = Some(size);
        }

        Ok(settings)
    }

    /// Check that every redaction pattern compiles
    pub fn validate(&self) -> Result<()> {
        for pattern in &self.redact_patterns {
            Regex::new(pattern)?;
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture_level: CaptureLevel::default(),
            storage: Arc::new(MemoryStore::new()),
            redact_patterns: Vec::new(),
            max_output_size: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("capture_level", &self.capture_level)
            .field("redact_patterns", &self.redact_patterns)
            .field("max_output_size", &self.max_output_size)
            .finish_non_exhaustive()
    }
}

fn global() -> &'static RwLock<Settings> {
    static SETTINGS: OnceLock<RwLock<Settings>> = OnceLock::new();
    SETTINGS.get_or_init(|| RwLock::new(Settings::default()))
}

/// Replace the global runtime configuration
///
/// Invalid settings are rejected here, at configuration time, and the
/// previous configuration stays in place.
pub fn configure(settings: Settings) -> Result<()> {
    settings.validate()?;
    *global().write() = settings;
    Ok(())
}

/// Return a copy of the current global settings
pub fn get_settings() -> Settings {
    global().read().clone()
}

/// Resolve a storage backend from its shorthand string
pub fn resolve_storage(shorthand: &str) -> Result<Arc<dyn StorageBackend>> {
    let shorthand = shorthand.trim();
    if shorthand == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(path) = shorthand.strip_prefix(FILE_SCHEME) {
        if path.is_empty() {
            return Err(NodetracerError::ConfigError(
                "file:// storage requires a directory path".to_string(),
            ));
        }
        return Ok(Arc::new(FileStore::new(path)));
    }
    Err(NodetracerError::ConfigError(format!(
        "Unsupported storage value {:?}. Use 'memory', 'file://<path>', or a StorageBackend instance.",
        shorthand
    )))
}
