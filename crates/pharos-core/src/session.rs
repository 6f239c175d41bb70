//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Subscription-lifecycle plumbing shared by the monitor, the reconciler, and
//! the readiness gate: a joinable task handle with a watch-channel kill
//! switch, and a key watcher that owns the resubscribe-on-failure policy.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use pharos_store::{KeySubscription, SharedGateway, Value};

/// Lifecycle handle for a background session task.
///
/// Signalling shutdown is synchronous; the task observes it at its next
/// suspension point and exits without processing further notifications.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub(crate) fn new(
        name: &'static str,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Signal the session to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the session task to exit.
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(task) = handle {
            if let Err(err) = task.await {
                warn!(session = self.name, error = %err, "session join error");
            }
        }
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn stop(&self) {
        self.shutdown();
        self.join().await;
    }
}

pub(crate) fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Waits for a shutdown signal. Resolves when the flag flips to true or the
/// sender side is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// A self-healing view onto one store key.
///
/// `next()` yields values in store order and never returns an error: failed
/// subscription establishment and torn subscriptions are retried on a fixed,
/// unbounded backoff. Callers cancel by dropping the future (it is used
/// inside `select!` loops), so a watcher holds no background task of its own.
#[derive(Debug)]
pub struct KeyWatcher {
    gateway: SharedGateway,
    key: String,
    backoff: Duration,
    subscription: Option<KeySubscription>,
}

impl KeyWatcher {
    pub fn new(gateway: SharedGateway, key: impl Into<String>, backoff: Duration) -> Self {
        Self {
            gateway,
            key: key.into(),
            backoff,
            subscription: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next value for this key, establishing or re-establishing the
    /// subscription as needed.
    pub async fn next(&mut self) -> Value {
        loop {
            if self.subscription.is_none() {
                match self.gateway.subscribe(&self.key) {
                    Ok(subscription) => {
                        debug!(key = %self.key, "subscription established");
                        self.subscription = Some(subscription);
                    }
                    Err(err) => {
                        warn!(key = %self.key, error = %err, "subscription establishment failed; retrying");
                        sleep(self.backoff).await;
                        continue;
                    }
                }
            }
            let Some(subscription) = self.subscription.as_mut() else {
                continue;
            };

            match subscription.recv().await {
                Ok(value) => return value,
                Err(err) if err.requires_resubscribe() => {
                    warn!(key = %self.key, error = %err, "subscription lost; re-establishing");
                    self.subscription = None;
                    sleep(self.backoff).await;
                }
                Err(err) => {
                    // The receiver is still usable after lag; skip ahead.
                    warn!(key = %self.key, error = %err, "subscription lagged");
                }
            }
        }
    }
}
