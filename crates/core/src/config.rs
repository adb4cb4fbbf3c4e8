//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the triage services, so
//! request handling never reads process-wide environment variables.

use crate::constants::{
    DEFAULT_MAX_ACTIVE_ALERTS, DEFAULT_MAX_AVERAGE_WAIT_MINUTES, DEFAULT_MAX_CRITICAL_WAITING,
    DEFAULT_OVERDUE_MINUTES,
};
use crate::error::{TriageError, TriageResult};
use chrono::Duration;
use serde::Deserialize;
use std::path::Path;
use triage_types::TriageLevel;

/// Thresholds used by the system health signal.
#[derive(Clone, Debug, PartialEq)]
pub struct HealthThresholds {
    pub max_critical_waiting: usize,
    pub max_average_wait_minutes: f64,
    pub max_active_alerts: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_critical_waiting: DEFAULT_MAX_CRITICAL_WAITING,
            max_average_wait_minutes: DEFAULT_MAX_AVERAGE_WAIT_MINUTES,
            max_active_alerts: DEFAULT_MAX_ACTIVE_ALERTS,
        }
    }
}

/// Triage configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct TriageConfig {
    overdue_minutes: [u32; 5],
    health: HealthThresholds,
    allow_waiting_completion: bool,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            overdue_minutes: DEFAULT_OVERDUE_MINUTES,
            health: HealthThresholds::default(),
            allow_waiting_completion: false,
        }
    }
}

impl TriageConfig {
    /// Create a new `TriageConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::Config`] if the health average-wait bound is negative or not a
    /// number.
    pub fn new(
        overdue_minutes: [u32; 5],
        health: HealthThresholds,
        allow_waiting_completion: bool,
    ) -> TriageResult<Self> {
        if !health.max_average_wait_minutes.is_finite() || health.max_average_wait_minutes < 0.0
        {
            return Err(TriageError::Config(
                "max_average_wait_minutes must be a non-negative number".into(),
            ));
        }

        Ok(Self {
            overdue_minutes,
            health,
            allow_waiting_completion,
        })
    }

    /// Parse configuration from YAML text. Missing keys fall back to defaults.
    ///
    /// Uses `serde_path_to_error` so a schema mismatch names the offending key
    /// (e.g. `overdue_minutes.level_3`).
    pub fn from_yaml_str(yaml_text: &str) -> TriageResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let file: ConfigFile = match serde_path_to_error::deserialize(deserializer) {
            Ok(parsed) => parsed,
            Err(err) => {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() {
                    "<root>"
                } else {
                    path.as_str()
                };
                return Err(TriageError::Config(format!(
                    "configuration schema mismatch at {path}: {source}"
                )));
            }
        };

        file.into_config()
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> TriageResult<Self> {
        let text = std::fs::read_to_string(path).map_err(TriageError::FileRead)?;
        Self::from_yaml_str(&text)
    }

    /// Resolve configuration from an optional file path (typically `TRIAGE_CONFIG_FILE`).
    pub fn resolve(path: Option<&Path>) -> TriageResult<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Acceptable wait before an entry of `level` counts as overdue.
    pub fn overdue_threshold(&self, level: TriageLevel) -> Duration {
        Duration::minutes(i64::from(self.overdue_minutes[level.index()]))
    }

    pub fn overdue_minutes(&self, level: TriageLevel) -> u32 {
        self.overdue_minutes[level.index()]
    }

    pub fn health(&self) -> &HealthThresholds {
        &self.health
    }

    /// Whether `CompleteQueueEntry` may close an entry that was never called (walk-away).
    pub fn allow_waiting_completion(&self) -> bool {
        self.allow_waiting_completion
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    overdue_minutes: Option<OverdueMinutesFile>,
    #[serde(default)]
    health: Option<HealthFile>,
    #[serde(default)]
    allow_waiting_completion: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverdueMinutesFile {
    level_1: Option<u32>,
    level_2: Option<u32>,
    level_3: Option<u32>,
    level_4: Option<u32>,
    level_5: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HealthFile {
    max_critical_waiting: Option<usize>,
    max_average_wait_minutes: Option<f64>,
    max_active_alerts: Option<usize>,
}

impl ConfigFile {
    fn into_config(self) -> TriageResult<TriageConfig> {
        let mut overdue = DEFAULT_OVERDUE_MINUTES;
        if let Some(o) = self.overdue_minutes {
            let given = [o.level_1, o.level_2, o.level_3, o.level_4, o.level_5];
            for (slot, value) in overdue.iter_mut().zip(given) {
                if let Some(value) = value {
                    *slot = value;
                }
            }
        }

        let mut health = HealthThresholds::default();
        if let Some(h) = self.health {
            if let Some(v) = h.max_critical_waiting {
                health.max_critical_waiting = v;
            }
            if let Some(v) = h.max_average_wait_minutes {
                health.max_average_wait_minutes = v;
            }
            if let Some(v) = h.max_active_alerts {
                health.max_active_alerts = v;
            }
        }

        TriageConfig::new(
            overdue,
            health,
            self.allow_waiting_completion.unwrap_or(false),
        )
    }
}
