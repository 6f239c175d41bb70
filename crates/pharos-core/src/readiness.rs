//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

use pharos_common::config::ReadinessConfig;
use pharos_store::SharedGateway;

use crate::session::{shutdown_channel, shutdown_requested, SessionHandle};

/// Lifecycle of the readiness gate: `Uninitialized -> Polling -> Ready`, with
/// `Ready` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Uninitialized,
    Polling,
    Ready,
}

/// Gates monitor and reconciler startup on store-gateway readiness.
///
/// Polls the gateway's initialization check on a fixed interval until it
/// reports success, flips ready exactly once, and performs no further
/// polling.
#[derive(Debug)]
pub struct ReadinessGate {
    gateway: SharedGateway,
    config: ReadinessConfig,
}

impl ReadinessGate {
    pub fn new(gateway: SharedGateway, config: ReadinessConfig) -> Self {
        Self { gateway, config }
    }

    pub fn start(self) -> GateHandle {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(GatePhase::Uninitialized);
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        debug!(phase = ?*phase_tx.borrow(), "readiness gate shutdown received");
                        break;
                    }
                    _ = ticker.tick() => {
                        phase_tx.send_if_modified(|phase| {
                            let first_poll = *phase == GatePhase::Uninitialized;
                            if first_poll {
                                *phase = GatePhase::Polling;
                            }
                            first_poll
                        });
                        if self.gateway.is_initialized() {
                            let _ = phase_tx.send(GatePhase::Ready);
                            let _ = ready_tx.send(true);
                            info!("store gateway ready");
                            break;
                        }
                        debug!("store gateway not ready yet");
                    }
                }
            }
        });

        GateHandle {
            ready: ready_rx,
            phase: phase_rx,
            session: SessionHandle::new("readiness-gate", shutdown_tx, task),
        }
    }
}

/// Handle onto a running readiness gate.
#[derive(Debug, Clone)]
pub struct GateHandle {
    ready: watch::Receiver<bool>,
    phase: watch::Receiver<GatePhase>,
    session: SessionHandle,
}

impl GateHandle {
    pub fn ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Current lifecycle phase of the gate.
    pub fn phase(&self) -> GatePhase {
        *self.phase.borrow()
    }

    /// Observable readiness flag for components that gate on it.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }

    /// Wait until the gate reports ready. Returns false if the gate was shut
    /// down before the store ever became ready.
    pub async fn wait_ready(&self) -> bool {
        let mut rx = self.ready.clone();
        let became_ready = rx.wait_for(|ready| *ready).await.is_ok();
        became_ready
    }

    pub async fn stop(&self) {
        self.session.stop().await;
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}
