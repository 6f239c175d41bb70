//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Core engine for supervising a single remote actuator through a realtime
//! key-value store: fuses an explicit status flag and a heartbeat timestamp
//! into one effective liveness verdict, and applies commands optimistically
//! with confirm-or-rollback reconciliation against the store's echo.

mod error;
mod keys;
mod liveness;
mod readiness;
mod reconcile;
mod session;
mod supervisor;

pub use error::CommandError;
pub use keys::DeviceKeys;
pub use liveness::{
    evaluate, LivenessMonitor, LivenessSignal, LivenessState, LivenessVerdict, MonitorHandle,
};
pub use readiness::{GateHandle, GatePhase, ReadinessGate};
pub use reconcile::{ActuatorState, CommandIntent, CommandReconciler, ReconcilerHandle};
pub use session::{KeyWatcher, SessionHandle};
pub use supervisor::DeviceSupervisor;
