//! Engine configuration from the environment

use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root of all project audio folders (`CALLFLOW_AUDIO_DIR`)
    pub audio_root: PathBuf,
    /// Root of per-call temporary folders (`CALLFLOW_TEMP_DIR`)
    pub temp_root: PathBuf,
    /// Default timeout for web interaction steps (`CALLFLOW_HTTP_TIMEOUT_MS`)
    pub http_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio_root: PathBuf::from("./audio"),
            temp_root: std::env::temp_dir().join("callflow"),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let http_timeout = match lookup("CALLFLOW_HTTP_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %raw, "Invalid CALLFLOW_HTTP_TIMEOUT_MS, using default");
                    defaults.http_timeout
                }
            },
            None => defaults.http_timeout,
        };

        Self {
            audio_root: lookup("CALLFLOW_AUDIO_DIR").map_or(defaults.audio_root, PathBuf::from),
            temp_root: lookup("CALLFLOW_TEMP_DIR").map_or(defaults.temp_root, PathBuf::from),
            http_timeout,
        }
    }

    /// Audio folder of one project
    pub fn audio_folder(&self, project: &str) -> PathBuf {
        self.audio_root.join(project)
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }
}
