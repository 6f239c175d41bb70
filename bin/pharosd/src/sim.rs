//! ---
//! phs_section: "01-core-functionality"
//! phs_subsection: "binary"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Simulated endpoint driver for the pharos daemon."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Stand-in for the real device when none is attached: publishes the status
//! flag and periodic heartbeats the way the firmware would, and can stop
//! heartbeating on schedule to demonstrate staleness-driven degradation.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use pharos_common::config::SimulationConfig;
use pharos_common::time::epoch_millis;
use pharos_core::DeviceKeys;
use pharos_store::{MemoryStore, StoreGateway};

/// Simulated device endpoint writing into the in-memory store.
pub struct SimulatedEndpoint {
    store: Arc<MemoryStore>,
    keys: DeviceKeys,
    config: SimulationConfig,
}

impl SimulatedEndpoint {
    pub fn new(store: Arc<MemoryStore>, keys: DeviceKeys, config: SimulationConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    pub fn start(self) -> SimHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            self.store.publish(&self.keys.status, json!("online"));
            info!(status = "online", "simulated endpoint announced itself");

            let mut actuator = match self.store.subscribe(&self.keys.actuator) {
                Ok(sub) => Some(sub),
                Err(err) => {
                    warn!(error = %err, "simulated endpoint could not watch the actuator");
                    None
                }
            };

            let mut heartbeats = interval(self.config.heartbeat_interval);
            let started = tokio::time::Instant::now();
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = heartbeats.tick() => {
                        if let Some(drop_after) = self.config.drop_after {
                            if started.elapsed() >= drop_after {
                                // Gone quiet: the status flag keeps claiming
                                // online, only the heartbeat stops. The
                                // monitor must catch this via staleness.
                                debug!("simulated endpoint heartbeat dropped");
                                continue;
                            }
                        }
                        self.store.publish(&self.keys.heartbeat, json!(epoch_millis() / 1000));
                    }
                    value = recv_actuator(&mut actuator) => {
                        match value {
                            Some(value) => info!(?value, "simulated endpoint applied actuator value"),
                            None => actuator = None,
                        }
                    }
                }
            }
            debug!("simulated endpoint loop exited");
        });
        SimHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn recv_actuator(
    subscription: &mut Option<pharos_store::KeySubscription>,
) -> Option<pharos_store::Value> {
    match subscription {
        Some(sub) => sub.recv().await.ok(),
        None => std::future::pending().await,
    }
}

/// Lifecycle handle for the simulated endpoint task.
pub struct SimHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SimHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "simulated endpoint join error");
        }
    }
}
