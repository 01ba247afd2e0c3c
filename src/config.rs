//! TOML configuration for the monitor.
//!
//! Layered: an explicit path, then the `CLOUDSEC_CONFIG` environment variable,
//! then `./cloudsec.toml`, then compiled-in defaults. Every section is
//! optional and falls back to its defaults field by field.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::alert::AlertSinkKind;
use crate::detect::rules::{Rule, RuleKind};
use crate::detect::Severity;

/// Longest accepted detection window (one week).
const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSecConfig {
    pub storage: StorageConfig,
    pub monitor: MonitorConfig,
    pub rules: RulesConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
}

impl CloudSecConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the configuration. An explicit path must load; the
    /// environment and working-directory fallbacks only warn on failure.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var("CLOUDSEC_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "CLOUDSEC_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new("cloudsec.toml");
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(error = %e, "cloudsec.toml could not be loaded, using defaults");
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.interval_secs == 0 {
            bail!("monitor.interval_secs must be greater than zero");
        }
        if self.storage.path.trim().is_empty() {
            bail!("storage.path must not be empty");
        }
        for (kind, rule) in self.rules.iter() {
            if rule.threshold == 0 {
                bail!("rules.{}.threshold must be greater than zero", kind);
            }
            if rule.window_secs == 0 || rule.window_secs > MAX_WINDOW_SECS {
                bail!("rules.{}.window_secs must be between 1 and {}", kind, MAX_WINDOW_SECS);
            }
        }
        Ok(())
    }

    /// Enabled rules, in evaluation order.
    pub fn active_rules(&self) -> Vec<Rule> {
        self.rules
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(kind, settings)| Rule::from_settings(kind, &settings))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. Parent directories are created on open.
    pub path: String,
    /// Back the duplicate check with a UNIQUE(event_id, rule_id) index.
    pub unique_incidents: bool,
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/cloudsec.db".to_string(),
            unique_incidents: false,
            connect_timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between detection cycles. Keep it shorter than the shortest rule window.
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Per-rule overrides. Omitted fields keep that rule's built-in value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub brute_force_ssh: RuleConfig,
    pub port_scan: RuleConfig,
}

impl RulesConfig {
    fn overrides(&self, kind: RuleKind) -> &RuleConfig {
        match kind {
            RuleKind::BruteForceSsh => &self.brute_force_ssh,
            RuleKind::PortScan => &self.port_scan,
        }
    }

    /// Effective settings of `kind`: overrides applied on top of the built-in rule.
    pub fn get(&self, kind: RuleKind) -> RuleSettings {
        let builtin = Rule::builtin(kind);
        let o = self.overrides(kind);
        RuleSettings {
            enabled: o.enabled.unwrap_or(true),
            window_secs: o
                .window_secs
                .unwrap_or_else(|| builtin.window.num_seconds().max(0) as u64),
            threshold: o.threshold.unwrap_or(builtin.threshold),
            severity: o.severity.unwrap_or(builtin.severity),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleKind, RuleSettings)> + '_ {
        RuleKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub enabled: Option<bool>,
    pub window_secs: Option<u64>,
    pub threshold: Option<u32>,
    pub severity: Option<Severity>,
}

/// Resolved tunables of one detection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSettings {
    pub enabled: bool,
    pub window_secs: u64,
    pub threshold: u32,
    pub severity: Severity,
}

// ---------------------------------------------------------------------------
// Alerts, logging, API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub sink: AlertSinkKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}
