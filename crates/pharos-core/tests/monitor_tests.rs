//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "tests"
//! phs_type: "source"
//! phs_scope: "test"
//! phs_description: "Integration tests for the liveness monitor."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use pharos_common::config::MonitorConfig;
use pharos_core::{DeviceKeys, LivenessMonitor, LivenessState, LivenessVerdict, MonitorHandle};
use pharos_store::MemoryStore;

const KEYS_STATUS: &str = "/devices/esp32/status";
const KEYS_HEARTBEAT: &str = "/devices/esp32/heartbeat";

fn fast_config(threshold: Duration) -> MonitorConfig {
    MonitorConfig {
        offline_threshold: threshold,
        tick_interval: Duration::from_millis(50),
        resubscribe_backoff: Duration::from_millis(50),
    }
}

fn start_monitor(store: &Arc<MemoryStore>, threshold: Duration) -> MonitorHandle {
    let gateway: Arc<dyn pharos_store::StoreGateway> = store.clone();
    LivenessMonitor::new(gateway, DeviceKeys::new("esp32"), fast_config(threshold)).start()
}

fn now_secs() -> u64 {
    pharos_common::epoch_millis() / 1000
}

async fn await_state(rx: &mut watch::Receiver<LivenessVerdict>, want: LivenessState) {
    timeout(Duration::from_secs(5), rx.wait_for(|v| v.state == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for verdict {want}"))
        .expect("verdict channel closed");
}

#[tokio::test]
async fn verdict_starts_unknown_without_signals() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    let monitor = start_monitor(&store, Duration::from_secs(60));

    sleep(Duration::from_millis(200)).await;
    let verdict = monitor.verdict();
    assert_eq!(verdict.state, LivenessState::Unknown);
    assert_eq!(verdict.stale_for_ms, None);

    monitor.stop().await;
}

#[tokio::test]
async fn fresh_heartbeat_and_online_status_yield_online() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    store.publish(KEYS_STATUS, json!("online"));
    store.publish(KEYS_HEARTBEAT, json!(now_secs()));

    let monitor = start_monitor(&store, Duration::from_secs(60));
    let mut rx = monitor.watch();
    await_state(&mut rx, LivenessState::Online).await;
    assert!(monitor.verdict().stale_for_ms.is_some());

    monitor.stop().await;
}

#[tokio::test]
async fn stale_heartbeat_is_sticky_against_online_claims() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    // Heartbeat 100 s in the past, endpoint still claiming online.
    store.publish(KEYS_HEARTBEAT, json!(now_secs() - 100));
    store.publish(KEYS_STATUS, json!("online"));

    let monitor = start_monitor(&store, Duration::from_secs(60));
    let mut rx = monitor.watch();
    await_state(&mut rx, LivenessState::Offline).await;

    // A repeated online claim must not clear the verdict while the
    // heartbeat stays stale.
    store.publish(KEYS_STATUS, json!("online"));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(monitor.verdict().state, LivenessState::Offline);

    // A fresh heartbeat does clear it.
    store.publish(KEYS_HEARTBEAT, json!(now_secs()));
    await_state(&mut rx, LivenessState::Online).await;

    monitor.stop().await;
}

#[tokio::test]
async fn verdict_degrades_via_tick_without_notifications() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    store.publish(KEYS_STATUS, json!("online"));
    store.publish(KEYS_HEARTBEAT, json!(now_secs()));

    // Tight threshold: the only heartbeat ever published goes stale while no
    // further notification arrives, so only the tick can flip the verdict.
    let monitor = start_monitor(&store, Duration::from_millis(1500));
    let mut rx = monitor.watch();
    await_state(&mut rx, LivenessState::Online).await;
    await_state(&mut rx, LivenessState::Offline).await;

    monitor.stop().await;
}

#[tokio::test]
async fn explicit_offline_status_forces_offline() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    store.publish(KEYS_HEARTBEAT, json!(now_secs()));
    store.publish(KEYS_STATUS, json!("offline"));

    let monitor = start_monitor(&store, Duration::from_secs(60));
    let mut rx = monitor.watch();
    await_state(&mut rx, LivenessState::Offline).await;

    monitor.stop().await;
}

#[tokio::test]
async fn subscription_failures_keep_verdict_unknown_until_retry_succeeds() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    store.set_fail_subscriptions(true);

    let monitor = start_monitor(&store, Duration::from_secs(60));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(monitor.verdict().state, LivenessState::Unknown);

    store.publish(KEYS_STATUS, json!("online"));
    store.publish(KEYS_HEARTBEAT, json!(now_secs()));
    store.set_fail_subscriptions(false);

    let mut rx = monitor.watch();
    await_state(&mut rx, LivenessState::Online).await;

    monitor.stop().await;
}

#[tokio::test]
async fn stop_halts_recomputes() {
    let store = Arc::new(MemoryStore::new());
    store.connect();
    store.publish(KEYS_STATUS, json!("online"));
    store.publish(KEYS_HEARTBEAT, json!(now_secs()));

    let monitor = start_monitor(&store, Duration::from_secs(60));
    let mut rx = monitor.watch();
    await_state(&mut rx, LivenessState::Online).await;
    monitor.stop().await;

    // Signals after teardown no longer reach the verdict.
    store.publish(KEYS_STATUS, json!("offline"));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(monitor.verdict().state, LivenessState::Online);
}
