//! Evidence Collection

use serde_json::{json, Value};
use sysinfo::System;

use crate::logic::events::SecurityEvent;

/// Host facts at collection time
pub fn system_snapshot() -> Value {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_processes();

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    json!({
        "hostname": hostname,
        "os": System::name(),
        "osVersion": System::os_version(),
        "kernelVersion": System::kernel_version(),
        "uptimeSecs": System::uptime(),
        "totalMemory": sys.total_memory(),
        "usedMemory": sys.used_memory(),
        "processCount": sys.processes().len(),
        "collectorVersion": crate::constants::APP_VERSION,
    })
}

/// Monitor events related to the incident, newest first
pub fn log_snapshot(events: &[SecurityEvent]) -> Value {
    let lines: Vec<Value> = events
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "timestamp": e.timestamp,
                "type": e.event_type.as_str(),
                "severity": e.severity.as_str(),
                "source": e.source,
                "userId": e.user_id,
                "ipAddress": e.ip_address,
            })
        })
        .collect();

    json!({ "count": lines.len(), "events": lines })
}
