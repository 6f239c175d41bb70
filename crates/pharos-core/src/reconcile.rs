//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Optimistic command application with confirm-or-rollback reconciliation.
//! A submitted intent flips the locally observed value before the store
//! round-trip completes; the store's echo on the actuator key either confirms
//! the intent or, on write failure, the optimistic update is reverted.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use pharos_store::{SharedGateway, Value};

use crate::error::CommandError;
use crate::keys::DeviceKeys;
use crate::liveness::{LivenessState, LivenessVerdict};
use crate::session::{shutdown_channel, shutdown_requested, KeyWatcher, SessionHandle};

/// Locally held view of the actuator. `observed` is the last value confirmed
/// by the store, or the optimistic value while an intent is in flight.
/// `pending` is true exactly while a command awaits confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorState {
    pub observed: bool,
    pub pending: bool,
}

/// One-shot request to set the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandIntent {
    pub desired: bool,
}

impl CommandIntent {
    pub fn set(desired: bool) -> Self {
        Self { desired }
    }
}

/// Reconciliation state machine per actuator. `Idle -> Pending` on submit;
/// `Pending -> Idle` on write failure or on a confirmation carrying the
/// desired value. No other transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentPhase {
    Idle,
    Pending { prior: bool, desired: bool },
}

#[derive(Debug)]
struct ReconcilerShared {
    actuator: ActuatorState,
    phase: IntentPhase,
}

impl ReconcilerShared {
    fn apply_confirmation(&mut self, confirmed: bool) {
        match self.phase {
            IntentPhase::Pending { desired, .. } if confirmed == desired => {
                self.phase = IntentPhase::Idle;
                self.actuator = ActuatorState {
                    observed: confirmed,
                    pending: false,
                };
                debug!(confirmed, "in-flight command confirmed");
            }
            IntentPhase::Pending { .. } => {
                // The echo is authoritative for the observed value, but it
                // does not confirm the intent still in flight.
                self.actuator.observed = confirmed;
                debug!(confirmed, "confirmation with mismatched value while pending");
            }
            IntentPhase::Idle => {
                // No outstanding intent: the store wins unconditionally. This
                // is how manual resets and third-party writers surface.
                self.actuator.observed = confirmed;
            }
        }
    }
}

/// Builder for the reconciliation session of one actuator key.
#[derive(Debug)]
pub struct CommandReconciler {
    gateway: SharedGateway,
    keys: DeviceKeys,
    verdict: watch::Receiver<LivenessVerdict>,
    ready: watch::Receiver<bool>,
    resubscribe_backoff: Duration,
}

impl CommandReconciler {
    pub fn new(
        gateway: SharedGateway,
        keys: DeviceKeys,
        verdict: watch::Receiver<LivenessVerdict>,
        ready: watch::Receiver<bool>,
        resubscribe_backoff: Duration,
    ) -> Self {
        Self {
            gateway,
            keys,
            verdict,
            ready,
            resubscribe_backoff,
        }
    }

    /// Spawn the confirmation session and return the command handle.
    ///
    /// `observed` is seeded from an initial read of the actuator key, falling
    /// back to `false` when the key is unset or the read fails.
    pub fn start(self) -> ReconcilerHandle {
        let shared = Arc::new(Mutex::new(ReconcilerShared {
            actuator: ActuatorState::default(),
            phase: IntentPhase::Idle,
        }));
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

        let task_shared = Arc::clone(&shared);
        let gateway = self.gateway.clone();
        let actuator_key = self.keys.actuator.clone();
        let backoff = self.resubscribe_backoff;
        let task = tokio::spawn(async move {
            match gateway.read(&actuator_key).await {
                Ok(Some(value)) => {
                    let observed = value.as_bool().unwrap_or(false);
                    task_shared.lock().actuator.observed = observed;
                    debug!(observed, "actuator state seeded from initial read");
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "initial actuator read failed; assuming false");
                }
            }

            let mut confirmations = KeyWatcher::new(gateway, actuator_key, backoff);
            loop {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        debug!("reconciler shutdown received");
                        break;
                    }
                    value = confirmations.next() => {
                        match value.as_bool() {
                            Some(confirmed) => task_shared.lock().apply_confirmation(confirmed),
                            None => warn!(?value, "non-boolean actuator notification ignored"),
                        }
                    }
                }
            }
            // Confirmations arriving past this point belong to a torn-down
            // session and are discarded with the subscription.
            debug!("reconciler loop exited");
        });

        ReconcilerHandle {
            gateway: self.gateway,
            keys: self.keys,
            verdict: self.verdict,
            ready: self.ready,
            shared,
            session: SessionHandle::new("command-reconciler", shutdown_tx, task),
        }
    }
}

/// Handle onto a running reconciliation session.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    gateway: SharedGateway,
    keys: DeviceKeys,
    verdict: watch::Receiver<LivenessVerdict>,
    ready: watch::Receiver<bool>,
    shared: Arc<Mutex<ReconcilerShared>>,
    session: SessionHandle,
}

impl ReconcilerHandle {
    /// Current actuator view.
    pub fn state(&self) -> ActuatorState {
        self.shared.lock().actuator
    }

    /// Convenience wrapper over [`Self::submit`].
    pub async fn set(&self, desired: bool) -> Result<(), CommandError> {
        self.submit(CommandIntent::set(desired)).await
    }

    /// Apply a command intent.
    ///
    /// Preconditions, checked in order: the gate has reported ready and the
    /// gateway is initialized (`NotReady`), the liveness verdict is `online`
    /// (`EndpointUnreachable`, no write issued), and no earlier intent is
    /// still pending (`CommandInFlight`).
    pub async fn submit(&self, intent: CommandIntent) -> Result<(), CommandError> {
        if !*self.ready.borrow() || !self.gateway.is_initialized() {
            return Err(CommandError::NotReady);
        }
        let verdict = self.verdict.borrow().clone();
        if verdict.state != LivenessState::Online {
            return Err(CommandError::EndpointUnreachable {
                state: verdict.state,
            });
        }

        let prior = {
            let mut shared = self.shared.lock();
            if matches!(shared.phase, IntentPhase::Pending { .. }) {
                return Err(CommandError::CommandInFlight);
            }
            let prior = shared.actuator.observed;
            shared.phase = IntentPhase::Pending {
                prior,
                desired: intent.desired,
            };
            shared.actuator = ActuatorState {
                observed: intent.desired,
                pending: true,
            };
            prior
        };
        info!(desired = intent.desired, "command applied optimistically");

        if let Err(err) = self
            .gateway
            .write(&self.keys.actuator, Value::Bool(intent.desired))
            .await
        {
            let mut shared = self.shared.lock();
            shared.phase = IntentPhase::Idle;
            shared.actuator = ActuatorState {
                observed: prior,
                pending: false,
            };
            warn!(error = %err, "actuator write failed; optimistic update reverted");
            return Err(CommandError::WriteFailed(err));
        }

        // The write is accepted but provisional: `pending` stays set until
        // the store echoes the desired value back on the actuator key.
        Ok(())
    }

    /// Stop the confirmation session. Late confirmations are discarded.
    pub async fn stop(&self) {
        self.session.stop().await;
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}
