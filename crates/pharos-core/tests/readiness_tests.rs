//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "tests"
//! phs_type: "source"
//! phs_scope: "test"
//! phs_description: "Integration tests for the readiness gate and supervisor wiring."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, timeout};

use pharos_common::config::{AppConfig, ReadinessConfig};
use pharos_core::{ActuatorState, DeviceSupervisor, GatePhase, LivenessState, ReadinessGate};
use pharos_store::MemoryStore;

fn fast_gate(store: &Arc<MemoryStore>) -> pharos_core::GateHandle {
    let gateway: Arc<dyn pharos_store::StoreGateway> = store.clone();
    ReadinessGate::new(
        gateway,
        ReadinessConfig {
            poll_interval: Duration::from_millis(20),
        },
    )
    .start()
}

#[tokio::test]
async fn gate_flips_ready_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let gate = fast_gate(&store);

    sleep(Duration::from_millis(100)).await;
    assert!(!gate.ready());
    assert_eq!(gate.phase(), GatePhase::Polling);

    store.connect();
    assert!(
        timeout(Duration::from_secs(2), gate.wait_ready())
            .await
            .expect("gate never became ready")
    );
    assert!(gate.ready());
    assert_eq!(gate.phase(), GatePhase::Ready);

    // Polling has stopped: losing the connection afterwards does not
    // revert the flag.
    store.disconnect();
    sleep(Duration::from_millis(100)).await;
    assert!(gate.ready());
    assert_eq!(gate.phase(), GatePhase::Ready);

    gate.stop().await;
}

#[tokio::test]
async fn gate_shutdown_before_ready_reports_failure() {
    let store = Arc::new(MemoryStore::new());
    let gate = fast_gate(&store);

    gate.stop().await;
    assert!(!gate.wait_ready().await);
    assert!(!gate.ready());
    assert_ne!(gate.phase(), GatePhase::Ready);
}

fn fast_app_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.readiness.poll_interval = Duration::from_millis(20);
    config.monitor.tick_interval = Duration::from_millis(50);
    config.monitor.resubscribe_backoff = Duration::from_millis(50);
    config
}

#[tokio::test]
async fn supervisor_waits_for_gate_then_runs_the_full_loop() {
    let store = Arc::new(MemoryStore::new());
    let gateway: Arc<dyn pharos_store::StoreGateway> = store.clone();

    // Connection comes up only after supervision has started waiting.
    let late_store = store.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        late_store.connect();
    });

    let config = fast_app_config();
    let supervisor = DeviceSupervisor::start(gateway, &config)
        .await
        .expect("supervisor start");

    // Endpoint comes alive.
    store.publish("/devices/esp32/status", json!("online"));
    store.publish(
        "/devices/esp32/heartbeat",
        json!(pharos_common::epoch_millis() / 1000),
    );
    let mut verdicts = supervisor.monitor().watch();
    timeout(
        Duration::from_secs(5),
        verdicts.wait_for(|v| v.state == LivenessState::Online),
    )
    .await
    .expect("verdict never went online")
    .expect("verdict channel closed");

    // Command flows end to end: optimistic apply, store echo, confirmation.
    supervisor.reconciler().set(true).await.expect("submit");
    let confirmed = ActuatorState {
        observed: true,
        pending: false,
    };
    for _ in 0..100 {
        if supervisor.reconciler().state() == confirmed {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(supervisor.reconciler().state(), confirmed);
    assert_eq!(store.writes_to("/devices/esp32/actuator"), 1);

    supervisor.shutdown().await;
}
