//! ---
//! phs_section: "01-core-functionality"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Shared primitives and utilities for the pharos runtime."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Core shared primitives for the pharos workspace.
//! This crate exposes configuration loading, logging initialization, and
//! wall-clock helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, DeviceConfig, LoggingConfig, MonitorConfig, ReadinessConfig, SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{epoch_millis, format_age, heartbeat_to_millis};
