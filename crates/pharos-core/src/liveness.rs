//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Liveness verdict fusion: an explicit status flag and a heartbeat timestamp
//! arrive independently over separate subscriptions, and a pure evaluation
//! rule collapses them into one effective verdict. A stale heartbeat is the
//! authoritative offline signal because it requires no live write-through
//! from the endpoint.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use pharos_common::config::MonitorConfig;
use pharos_common::time::{epoch_millis, format_age, heartbeat_to_millis};
use pharos_store::{SharedGateway, Value};

use crate::keys::DeviceKeys;
use crate::session::{shutdown_channel, shutdown_requested, KeyWatcher, SessionHandle};

/// Effective reachability of the monitored endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LivenessState {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl LivenessState {
    /// Parse the wire-level status flag. Anything the endpoint publishes
    /// outside `online`/`offline` maps to `Unknown`.
    pub fn from_signal(signal: &str) -> Self {
        signal.parse().unwrap_or(LivenessState::Unknown)
    }
}

/// Raw inputs to verdict evaluation, updated independently by the status and
/// heartbeat subscriptions. `heartbeat_at_ms == 0` means no heartbeat has
/// ever been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LivenessSignal {
    pub explicit: LivenessState,
    pub heartbeat_at_ms: u64,
}

/// Derived verdict. `stale_for_ms` is the age of the last heartbeat at
/// evaluation time, present whenever a heartbeat has been observed, so
/// callers can render last-activity continuously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessVerdict {
    pub state: LivenessState,
    pub stale_for_ms: Option<u64>,
}

impl LivenessVerdict {
    fn unknown() -> Self {
        Self {
            state: LivenessState::Unknown,
            stale_for_ms: None,
        }
    }

    /// Human-readable last-activity string, when a heartbeat has been seen.
    pub fn last_activity(&self) -> Option<String> {
        self.stale_for_ms.map(format_age)
    }
}

/// Deterministic verdict evaluation.
///
/// A heartbeat older than `offline_threshold_ms` forces `Offline` whatever
/// the explicit status claims; staleness stays sticky until a fresh heartbeat
/// arrives. Without any observed heartbeat the explicit status governs, and
/// an explicit `Offline` is authoritative in every case.
pub fn evaluate(signal: &LivenessSignal, now_ms: u64, offline_threshold_ms: u64) -> LivenessVerdict {
    let stale_for_ms =
        (signal.heartbeat_at_ms > 0).then(|| now_ms.saturating_sub(signal.heartbeat_at_ms));
    let state = match stale_for_ms {
        Some(age) if age > offline_threshold_ms => LivenessState::Offline,
        _ => signal.explicit,
    };
    LivenessVerdict { state, stale_for_ms }
}

/// Fuses the status and heartbeat subscriptions into a continuously
/// re-evaluated [`LivenessVerdict`].
#[derive(Debug)]
pub struct LivenessMonitor {
    gateway: SharedGateway,
    keys: DeviceKeys,
    config: MonitorConfig,
}

impl LivenessMonitor {
    pub fn new(gateway: SharedGateway, keys: DeviceKeys, config: MonitorConfig) -> Self {
        Self {
            gateway,
            keys,
            config,
        }
    }

    /// Spawn the monitor session. The verdict starts `Unknown` and is
    /// recomputed on every signal arrival and on a fixed tick so it degrades
    /// to `Offline` even when no notifications arrive at all.
    pub fn start(self) -> MonitorHandle {
        let (verdict_tx, verdict_rx) = watch::channel(LivenessVerdict::unknown());
        let (shutdown_tx, mut shutdown_rx) = shutdown_channel();

        let threshold_ms = self.config.offline_threshold.as_millis() as u64;
        let keys = self.keys.clone();
        let task = tokio::spawn(async move {
            // The signal lives here and only here: both subscriptions and the
            // tick mutate and read the same owned state, never copies of it.
            let mut signal = LivenessSignal::default();
            let mut status =
                KeyWatcher::new(self.gateway.clone(), keys.status, self.config.resubscribe_backoff);
            let mut heartbeat = KeyWatcher::new(
                self.gateway.clone(),
                keys.heartbeat,
                self.config.resubscribe_backoff,
            );
            let mut ticker = interval(self.config.tick_interval);

            loop {
                tokio::select! {
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        debug!("liveness monitor shutdown received");
                        break;
                    }
                    value = status.next() => apply_status(&mut signal, &value),
                    value = heartbeat.next() => apply_heartbeat(&mut signal, &value),
                    _ = ticker.tick() => {}
                }

                let verdict = evaluate(&signal, epoch_millis(), threshold_ms);
                let previous = verdict_tx.borrow().state;
                verdict_tx.send_if_modified(|current| {
                    if *current == verdict {
                        false
                    } else {
                        *current = verdict.clone();
                        true
                    }
                });
                if previous != verdict.state {
                    info!(
                        state = %verdict.state,
                        stale_for_ms = ?verdict.stale_for_ms,
                        "liveness verdict changed"
                    );
                }
            }
            debug!("liveness monitor loop exited");
        });

        MonitorHandle {
            verdict: verdict_rx,
            session: SessionHandle::new("liveness-monitor", shutdown_tx, task),
        }
    }
}

fn apply_status(signal: &mut LivenessSignal, value: &Value) {
    match value.as_str() {
        Some(text) => signal.explicit = LivenessState::from_signal(text),
        None => {
            warn!(?value, "non-string status notification ignored");
        }
    }
}

fn apply_heartbeat(signal: &mut LivenessSignal, value: &Value) {
    match value.as_u64() {
        Some(epoch_seconds) => signal.heartbeat_at_ms = heartbeat_to_millis(epoch_seconds),
        None => {
            warn!(?value, "non-integer heartbeat notification ignored");
        }
    }
}

/// Handle onto a running liveness monitor session.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    verdict: watch::Receiver<LivenessVerdict>,
    session: SessionHandle,
}

impl MonitorHandle {
    /// Current verdict, readable synchronously.
    pub fn verdict(&self) -> LivenessVerdict {
        self.verdict.borrow().clone()
    }

    /// Stream of verdict changes. Identical re-evaluations are not published.
    pub fn watch(&self) -> watch::Receiver<LivenessVerdict> {
        self.verdict.clone()
    }

    /// Stop the monitor: both subscriptions and the tick end; no recompute
    /// happens after this resolves.
    pub async fn stop(&self) {
        self.session.stop().await;
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD_MS: u64 = 60_000;

    fn signal(explicit: LivenessState, heartbeat_at_ms: u64) -> LivenessSignal {
        LivenessSignal {
            explicit,
            heartbeat_at_ms,
        }
    }

    #[test]
    fn fresh_heartbeat_mirrors_explicit_status() {
        // Heartbeat at t=1_000_000 ms, evaluated 30 s later.
        let verdict = evaluate(
            &signal(LivenessState::Online, 1_000_000),
            1_000_000 + 30_000,
            THRESHOLD_MS,
        );
        assert_eq!(verdict.state, LivenessState::Online);
        assert_eq!(verdict.stale_for_ms, Some(30_000));
    }

    #[test]
    fn stale_heartbeat_overrides_explicit_online() {
        // Same inputs evaluated 70 s later: staleness wins.
        let verdict = evaluate(
            &signal(LivenessState::Online, 1_000_000),
            1_000_000 + 70_000,
            THRESHOLD_MS,
        );
        assert_eq!(verdict.state, LivenessState::Offline);
        assert_eq!(verdict.stale_for_ms, Some(70_000));
    }

    #[test]
    fn explicit_offline_is_authoritative_with_fresh_heartbeat() {
        let verdict = evaluate(
            &signal(LivenessState::Offline, 1_000_000),
            1_000_000 + 1_000,
            THRESHOLD_MS,
        );
        assert_eq!(verdict.state, LivenessState::Offline);
    }

    #[test]
    fn no_heartbeat_defers_to_explicit_status() {
        let verdict = evaluate(&signal(LivenessState::Online, 0), 5_000_000, THRESHOLD_MS);
        assert_eq!(verdict.state, LivenessState::Online);
        assert_eq!(verdict.stale_for_ms, None);

        let verdict = evaluate(&signal(LivenessState::Unknown, 0), 5_000_000, THRESHOLD_MS);
        assert_eq!(verdict.state, LivenessState::Unknown);
    }

    #[test]
    fn evaluation_is_idempotent_for_identical_inputs() {
        let input = signal(LivenessState::Online, 2_000_000);
        let first = evaluate(&input, 2_030_000, THRESHOLD_MS);
        let second = evaluate(&input, 2_030_000, THRESHOLD_MS);
        assert_eq!(first, second);
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        // Exactly at the threshold is still whatever the endpoint claims.
        let verdict = evaluate(
            &signal(LivenessState::Online, 1_000_000),
            1_000_000 + THRESHOLD_MS,
            THRESHOLD_MS,
        );
        assert_eq!(verdict.state, LivenessState::Online);

        let verdict = evaluate(
            &signal(LivenessState::Online, 1_000_000),
            1_000_000 + THRESHOLD_MS + 1,
            THRESHOLD_MS,
        );
        assert_eq!(verdict.state, LivenessState::Offline);
    }

    #[test]
    fn wire_status_parsing_defaults_to_unknown() {
        assert_eq!(LivenessState::from_signal("online"), LivenessState::Online);
        assert_eq!(LivenessState::from_signal("offline"), LivenessState::Offline);
        assert_eq!(LivenessState::from_signal("rebooting"), LivenessState::Unknown);
        assert_eq!(LivenessState::from_signal(""), LivenessState::Unknown);
    }

    #[test]
    fn last_activity_renders_heartbeat_age() {
        let verdict = evaluate(
            &signal(LivenessState::Online, 1_000_000),
            1_000_000 + 42_000,
            THRESHOLD_MS,
        );
        assert_eq!(verdict.last_activity().as_deref(), Some("42s ago"));
    }
}
