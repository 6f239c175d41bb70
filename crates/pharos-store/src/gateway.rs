//! ---
//! phs_section: "02-store-gateway"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Realtime store gateway trait and in-memory backend."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StoreError;

/// Values carried by the realtime store are JSON-typed: the status key holds a
/// string, the heartbeat key an integer, the actuator key a boolean.
pub type Value = serde_json::Value;

/// Shared, process-wide gateway handle. The connection is lazily established
/// and shared by every monitor and reconciler; no component owns it.
pub type SharedGateway = Arc<dyn StoreGateway>;

/// Contract with the remote realtime key-value store.
///
/// Writes are asynchronous with at-least-once delivery and no transaction
/// semantics. Subscriptions deliver every change to a key, including the value
/// current at subscribe time, and never resubscribe themselves after an error.
#[async_trait]
pub trait StoreGateway: Send + Sync + fmt::Debug {
    /// One-shot fetch of the current value at `key`, `None` if unset.
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Asynchronous write of `value` to `key`.
    async fn write(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Open a change feed for `key`. Dropping the returned subscription
    /// unsubscribes.
    fn subscribe(&self, key: &str) -> Result<KeySubscription, StoreError>;

    /// Non-blocking check of connection readiness.
    fn is_initialized(&self) -> bool;
}

/// A live subscription to a single key.
///
/// The first `recv` yields the value observed at subscribe time (when the key
/// was set); later calls yield subsequent changes in store order. Errors are
/// terminal for this subscription unless [`StoreError::requires_resubscribe`]
/// says otherwise.
#[derive(Debug)]
pub struct KeySubscription {
    key: String,
    initial: Option<Value>,
    rx: broadcast::Receiver<Value>,
}

impl KeySubscription {
    pub(crate) fn new(
        key: impl Into<String>,
        initial: Option<Value>,
        rx: broadcast::Receiver<Value>,
    ) -> Self {
        Self {
            key: key.into(),
            initial,
            rx,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next value on this key.
    pub async fn recv(&mut self) -> Result<Value, StoreError> {
        if let Some(initial) = self.initial.take() {
            return Ok(initial);
        }
        match self.rx.recv().await {
            Ok(value) => Ok(value),
            Err(broadcast::error::RecvError::Closed) => Err(StoreError::SubscriptionClosed {
                key: self.key.clone(),
            }),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                Err(StoreError::SubscriptionLagged {
                    key: self.key.clone(),
                    missed,
                })
            }
        }
    }
}
