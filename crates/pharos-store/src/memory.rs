//! ---
//! phs_section: "02-store-gateway"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Realtime store gateway trait and in-memory backend."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::StoreError;
use crate::gateway::{KeySubscription, StoreGateway, Value};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, Value>,
    channels: HashMap<String, broadcast::Sender<Value>>,
    write_log: Vec<(String, Value)>,
}

impl MemoryInner {
    fn sender(&mut self, key: &str) -> broadcast::Sender<Value> {
        self.channels
            .entry(key.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// In-memory realtime store with per-key pub/sub fan-out.
///
/// Backs the simulation mode of the daemon and the test suites. Beyond the
/// [`StoreGateway`] contract it records every controller write and can inject
/// faults (rejected writes, refused subscriptions) to exercise the failure
/// paths of the engine.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    initialized: AtomicBool,
    fail_writes: AtomicBool,
    fail_subscriptions: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the connection as established. Until this is called every gateway
    /// operation reports [`StoreError::NotInitialized`].
    pub fn connect(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Apply a value as if the endpoint (or any third-party writer) had set
    /// it: the value is stored and fanned out to subscribers, bypassing the
    /// controller-side write log and fault flags.
    pub fn publish(&self, key: &str, value: Value) {
        let mut inner = self.inner.lock();
        inner.values.insert(key.to_owned(), value.clone());
        let sender = inner.sender(key);
        drop(inner);
        let _ = sender.send(value);
    }

    /// Reject all subsequent controller writes while set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Refuse all subsequent subscription attempts while set. Existing
    /// subscriptions keep flowing.
    pub fn set_fail_subscriptions(&self, fail: bool) {
        self.fail_subscriptions.store(fail, Ordering::SeqCst);
    }

    /// Number of controller writes issued against `key`.
    pub fn writes_to(&self, key: &str) -> usize {
        self.inner
            .lock()
            .write_log
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }

    /// Full controller write log, in issue order.
    pub fn write_log(&self) -> Vec<(String, Value)> {
        self.inner.lock().write_log.clone()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        Ok(self.inner.lock().values.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteRejected {
                key: key.to_owned(),
                reason: "write fault injected".to_owned(),
            });
        }
        let sender = {
            let mut inner = self.inner.lock();
            inner.write_log.push((key.to_owned(), value.clone()));
            inner.values.insert(key.to_owned(), value.clone());
            inner.sender(key)
        };
        // The store echoes accepted writes back to every subscriber, which is
        // what closes the reconciliation loop.
        let _ = sender.send(value);
        debug!(key = %key, "memory store write applied");
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Result<KeySubscription, StoreError> {
        if !self.is_initialized() {
            return Err(StoreError::NotInitialized);
        }
        if self.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(StoreError::SubscribeFailed {
                key: key.to_owned(),
                reason: "subscription fault injected".to_owned(),
            });
        }
        let mut inner = self.inner.lock();
        let initial = inner.values.get(key).cloned();
        let rx = inner.sender(key).subscribe();
        Ok(KeySubscription::new(key, initial, rx))
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscription_sees_initial_value_then_changes() {
        let store = MemoryStore::new();
        store.connect();
        store.publish("devices/esp32/actuator", json!(true));

        let mut sub = store.subscribe("devices/esp32/actuator").expect("subscribe");
        assert_eq!(sub.recv().await.expect("initial"), json!(true));

        store.publish("devices/esp32/actuator", json!(false));
        assert_eq!(sub.recv().await.expect("change"), json!(false));
    }

    #[tokio::test]
    async fn controller_writes_are_logged_and_echoed() {
        let store = MemoryStore::new();
        store.connect();
        let mut sub = store.subscribe("devices/esp32/actuator").expect("subscribe");

        store
            .write("devices/esp32/actuator", json!(true))
            .await
            .expect("write");
        assert_eq!(store.writes_to("devices/esp32/actuator"), 1);
        assert_eq!(sub.recv().await.expect("echo"), json!(true));
    }

    #[tokio::test]
    async fn injected_write_fault_rejects_without_mutation() {
        let store = MemoryStore::new();
        store.connect();
        store.set_fail_writes(true);

        let err = store
            .write("devices/esp32/actuator", json!(true))
            .await
            .expect_err("rejected");
        assert!(matches!(err, StoreError::WriteRejected { .. }));
        assert_eq!(store.writes_to("devices/esp32/actuator"), 0);
        assert_eq!(store.read("devices/esp32/actuator").await.expect("read"), None);
    }

    #[tokio::test]
    async fn operations_require_initialization() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read("devices/esp32/status").await,
            Err(StoreError::NotInitialized)
        ));
        assert!(store.subscribe("devices/esp32/status").is_err());
        assert!(!store.is_initialized());

        store.connect();
        assert!(store.is_initialized());
        assert!(store.subscribe("devices/esp32/status").is_ok());
    }
}
