//! Event Taxonomy
//!
//! Shared vocabulary for all engines: event types, severities, alert and
//! channel records, ID generation. No engine behavior lives here.

pub mod types;
pub mod alert;

pub use types::{EventDetails, EventOptions, SecurityEvent, SecurityEventType, Severity};
pub use alert::{
    AlertChannel, AlertStatus, ChannelConfig, ChannelType, ChannelUpdate, SecurityAlert,
};

use uuid::Uuid;

/// Generate a unique, prefixed identifier (e.g. `evt_3f2a...`)
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Build an `EventDetails` map from `(key, value)` pairs
#[macro_export]
macro_rules! details {
    () => { $crate::logic::events::EventDetails::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::logic::events::EventDetails::new();
        $( map.insert($key.to_string(), ::serde_json::json!($value)); )+
        map
    }};
}
