//! # Runtime settings.
//!
//! [`Config`] centralizes the knobs of the runtime loop: shutdown grace,
//! blocking pool size, lifecycle bus capacity, payload dedup policy and the
//! defaults applied to every supervised process.
//!
//! Settings come from an optional TOML file; every field has a default, so an
//! empty file (or no file at all) is a valid configuration.
//!
//! ```toml
//! grace_secs = 5
//! blocking_threads = 4
//!
//! [dedup]
//! attach_event_class = true
//! compare_event_class = false
//!
//! [process]
//! retries = 5
//! retry_threshold_secs = 30
//!
//! [process.backoff]
//! first_secs = 2
//! factor = 2.0
//! ```
//!
//! ## Sentinel values
//! - `blocking_threads = 0` → clamped to 1
//! - `bus_capacity = 0` → clamped to 1
//! - `process.restart_every_secs = 0` → no scheduled restarts

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::RuntimeError;
use crate::listeners::DedupPolicy;
use crate::process::ProcessDefaults;

/// Directory name used under `$XDG_CONFIG_HOME`.
const APP_DIR: &str = "deskvisor";
/// File name of the settings file.
const FILE_NAME: &str = "config.toml";

/// Global settings for the runtime loop.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum time `stop()` waits for tracked tasks before giving up.
    pub grace_secs: u64,
    /// Size of the auxiliary pool used for blocking calls.
    pub blocking_threads: usize,
    /// Capacity of the lifecycle event bus ring buffer.
    pub bus_capacity: usize,
    /// Duplicate-suppression policy for listener payloads.
    pub dedup: DedupPolicy,
    /// Defaults for supervised processes.
    pub process: ProcessDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grace_secs: 5,
            blocking_threads: 4,
            bus_capacity: 1024,
            dedup: DedupPolicy::default(),
            process: ProcessDefaults::default(),
        }
    }
}

impl Config {
    /// Shutdown grace period.
    #[inline]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Blocking pool size, never below 1.
    #[inline]
    pub fn blocking_threads_clamped(&self) -> usize {
        self.blocking_threads.max(1)
    }

    /// Bus capacity, never below 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Parses settings from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, RuntimeError> {
        toml::from_str(text).map_err(|e| RuntimeError::ConfigInvalid {
            path: origin.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Loads settings.
    ///
    /// - `Some(path)`: the file must exist, otherwise [`RuntimeError::ConfigNotFound`].
    /// - `None`: reads [`Config::default_path`] when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, RuntimeError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    Err(RuntimeError::ConfigNotFound { path })
                } else {
                    Ok(Self::default())
                }
            }
            Err(e) => Err(RuntimeError::ConfigInvalid {
                path,
                error: e.to_string(),
            }),
        }
    }

    /// `$XDG_CONFIG_HOME/deskvisor/config.toml`, falling back to `~/.config`.
    pub fn default_path() -> Option<PathBuf> {
        let base = match std::env::var_os("XDG_CONFIG_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
        };
        Some(base.join(APP_DIR).join(FILE_NAME))
    }
}

/// Serde helper: whole seconds as [`Duration`].
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
