//! ---
//! phs_section: "01-core-functionality"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Shared primitives and utilities for the pharos runtime."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_device_id() -> String {
    "esp32".to_owned()
}

fn default_offline_threshold() -> Duration {
    Duration::from_millis(60_000)
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_resubscribe_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_sim_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the pharos runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "PHAROS_CONFIG";

    /// Load configuration from disk, respecting the `PHAROS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.device.device_id.trim().is_empty() {
            return Err(anyhow!("device.device_id must not be empty"));
        }
        self.monitor.validate()?;
        if self.readiness.poll_interval.is_zero() {
            return Err(anyhow!("readiness.poll_interval must be non-zero"));
        }
        Ok(())
    }
}

/// Identity of the monitored endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
        }
    }
}

/// Timing knobs for the liveness monitor.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// A heartbeat older than this is treated as an authoritative offline
    /// signal, whatever the endpoint claims about itself.
    #[serde(default = "default_offline_threshold")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub offline_threshold: Duration,
    /// Period of the recompute tick. Governs display freshness, not verdict
    /// correctness.
    #[serde(default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// Fixed backoff between subscription establishment attempts.
    #[serde(default = "default_resubscribe_backoff")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub resubscribe_backoff: Duration,
}

impl MonitorConfig {
    fn validate(&self) -> Result<()> {
        if self.offline_threshold.is_zero() {
            return Err(anyhow!("monitor.offline_threshold must be non-zero"));
        }
        if self.tick_interval.is_zero() {
            return Err(anyhow!("monitor.tick_interval must be non-zero"));
        }
        if self.resubscribe_backoff.is_zero() {
            return Err(anyhow!("monitor.resubscribe_backoff must be non-zero"));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            offline_threshold: default_offline_threshold(),
            tick_interval: default_tick_interval(),
            resubscribe_backoff: default_resubscribe_backoff(),
        }
    }
}

/// Timing knobs for the readiness gate.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

/// Logging sink configuration consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}

/// Simulated endpoint driver used when no real device is attached.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sim_heartbeat_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub heartbeat_interval: Duration,
    /// Stop heartbeating after this long, leaving the status flag claiming
    /// online. Exercises staleness-driven degradation end to end.
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub drop_after: Option<Duration>,
    /// Issue a toggle command on this period, driving the reconciler from
    /// inside the daemon when no external caller is attached.
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub toggle_interval: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            heartbeat_interval: default_sim_heartbeat_interval(),
            drop_after: None,
            toggle_interval: None,
        }
    }
}
