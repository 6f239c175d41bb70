//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use anyhow::{anyhow, Result};
use tracing::info;

use pharos_common::config::AppConfig;
use pharos_store::SharedGateway;

use crate::keys::DeviceKeys;
use crate::liveness::{LivenessMonitor, MonitorHandle};
use crate::readiness::{GateHandle, ReadinessGate};
use crate::reconcile::{CommandReconciler, ReconcilerHandle};

/// Wires the full control flow for one monitored device: readiness gate,
/// then liveness monitor, then command reconciler, all against a shared
/// store gateway.
#[derive(Debug)]
pub struct DeviceSupervisor {
    device_id: String,
    gate: GateHandle,
    monitor: MonitorHandle,
    reconciler: ReconcilerHandle,
}

impl DeviceSupervisor {
    /// Start supervision. Resolves once the readiness gate has observed an
    /// initialized gateway and both engine sessions are running.
    pub async fn start(gateway: SharedGateway, config: &AppConfig) -> Result<Self> {
        let device_id = config.device.device_id.clone();
        let keys = DeviceKeys::new(&device_id);

        let gate = ReadinessGate::new(gateway.clone(), config.readiness.clone()).start();
        if !gate.wait_ready().await {
            return Err(anyhow!(
                "readiness gate shut down before the store became ready"
            ));
        }

        let monitor =
            LivenessMonitor::new(gateway.clone(), keys.clone(), config.monitor.clone()).start();
        let reconciler = CommandReconciler::new(
            gateway,
            keys,
            monitor.watch(),
            gate.watch(),
            config.monitor.resubscribe_backoff,
        )
        .start();

        info!(device = %device_id, "device supervision started");
        Ok(Self {
            device_id,
            gate,
            monitor,
            reconciler,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    pub fn reconciler(&self) -> &ReconcilerHandle {
        &self.reconciler
    }

    /// Tear down all sessions: subscriptions and timers are cancelled, any
    /// in-flight write completes in the store but its confirmation is
    /// discarded.
    pub async fn shutdown(&self) {
        self.reconciler.stop().await;
        self.monitor.stop().await;
        self.gate.stop().await;
        info!(device = %self.device_id, "device supervision stopped");
    }
}
