//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---

/// Store key layout for a monitored device.
///
/// The endpoint publishes under `/devices/{device_id}`: a string `status`
/// flag, an integer `heartbeat` timestamp (epoch seconds), and a boolean
/// `actuator` value that both sides read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceKeys {
    pub status: String,
    pub heartbeat: String,
    pub actuator: String,
}

impl DeviceKeys {
    pub fn new(device_id: &str) -> Self {
        let base = format!("/devices/{device_id}");
        Self {
            status: format!("{base}/status"),
            heartbeat: format!("{base}/heartbeat"),
            actuator: format!("{base}/actuator"),
        }
    }
}
