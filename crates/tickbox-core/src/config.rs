#![forbid(unsafe_code)]

//! Initialization options.
//!
//! [`AppConfig`] carries everything [`App::init`](crate::app::App::init)
//! needs. The serializable subset can be read from JSON with camelCase keys:
//!
//! ```json
//! { "attachPoint": "todoapp", "storageKey": "todos", "saveWindowMs": 500,
//!   "errorClearMs": 2000, "transientErrors": false }
//! ```

use std::fmt;
use std::rc::Rc;

use serde::Deserialize;
use thiserror::Error;
use web_time::Duration;

use crate::persist::{DEFAULT_SAVE_WINDOW, STORAGE_KEY};
use crate::validation::{ErrorReporter, TransientReporter};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("attachPoint must be defined")]
    MissingAttachPoint,

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which reporter validation failures go to.
#[derive(Clone, Default)]
pub enum ReporterChoice {
    /// Blocking stderr alert.
    #[default]
    Alert,
    /// Self-clearing message cell.
    Transient,
    /// Caller-supplied hook.
    Custom(Rc<dyn ErrorReporter>),
}

impl fmt::Debug for ReporterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alert => f.write_str("Alert"),
            Self::Transient => f.write_str("Transient"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Identifier of the host element the app renders into. Required.
    pub attach_point: Option<String>,
    pub validation_error_handler: ReporterChoice,
    pub storage_key: String,
    pub save_window: Duration,
    /// How long a transient error message stays up.
    pub error_clear_after: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            attach_point: None,
            validation_error_handler: ReporterChoice::Alert,
            storage_key: STORAGE_KEY.to_owned(),
            save_window: DEFAULT_SAVE_WINDOW,
            error_clear_after: TransientReporter::DEFAULT_CLEAR_AFTER,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    attach_point: Option<String>,
    storage_key: Option<String>,
    save_window_ms: Option<u64>,
    error_clear_ms: Option<u64>,
    transient_errors: bool,
}

impl AppConfig {
    #[must_use]
    pub fn new(attach_point: impl Into<String>) -> Self {
        Self {
            attach_point: Some(attach_point.into()),
            ..Self::default()
        }
    }

    /// Parse the serializable options. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        let defaults = Self::default();
        Ok(Self {
            attach_point: raw.attach_point,
            validation_error_handler: if raw.transient_errors {
                ReporterChoice::Transient
            } else {
                ReporterChoice::Alert
            },
            storage_key: raw.storage_key.unwrap_or(defaults.storage_key),
            save_window: raw
                .save_window_ms
                .map_or(defaults.save_window, Duration::from_millis),
            error_clear_after: raw
                .error_clear_ms
                .map_or(defaults.error_clear_after, Duration::from_millis),
        })
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.validation_error_handler = ReporterChoice::Custom(reporter);
        self
    }

    #[must_use]
    pub fn with_transient_errors(mut self, clear_after: Duration) -> Self {
        self.validation_error_handler = ReporterChoice::Transient;
        self.error_clear_after = clear_after;
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_save_window(mut self, window: Duration) -> Self {
        self.save_window = window;
        self
    }

    /// The attach point, if present and not blank.
    pub fn require_attach_point(&self) -> Result<&str, ConfigError> {
        self.attach_point
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingAttachPoint)
    }
}
