//! `erratic-types` – shared vocabulary of the Erratic bridge.
//!
//! - [`device`] – the device-framework message model: type discriminators,
//!   interface codes, [`DeviceAddress`][device::DeviceAddress] and the
//!   [`Message`][device::Message] envelope.
//! - [`payload`] – fixed little-endian layouts for every payload the bridge
//!   exchanges with the controller.
//! - [`msgs`] – bus-side messages (odometry, power state, transforms, twist).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod device;
pub mod msgs;
pub mod payload;

pub use device::{DeviceAddress, Interface, Message, MessageHeader, MessageType};
pub use msgs::{
    Header, Odometry, Pose, PowerState, Quaternion, Time, TransformStamped, Twist, Vector3,
};

/// Unified envelope for everything that travels over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "erratic-bridge::odom"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Odometry(Odometry),
    PowerState(PowerState),
    Transform(TransformStamped),
    Twist(Twist),
}

/// Error type shared by the device layer, the bus and the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Driver initialisation failed: {0}")]
    DriverInit(String),

    #[error("No device registered at {0}")]
    DeviceNotFound(DeviceAddress),

    #[error("Failed to subscribe to {addr}: {details}")]
    Subscribe { addr: DeviceAddress, details: String },

    #[error("Failed to unsubscribe from {addr}: {details}")]
    Unsubscribe { addr: DeviceAddress, details: String },

    #[error("Request {subtype} to {addr} failed: {details}")]
    RequestFailed {
        addr: DeviceAddress,
        subtype: u8,
        details: String,
    },

    #[error("Malformed {what} payload: expected {expected} bytes, got {actual}")]
    Decode {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Bus channel error: {0}")]
    Channel(String),

    #[error("Invalid device address '{0}'")]
    InvalidAddress(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_keeps_source_and_payload_kind() {
        let event = Event::new(
            "erratic-bridge::cmd_vel",
            EventPayload::Twist(Twist {
                linear: Vector3::new(0.4, 0.0, 0.0),
                angular: Vector3::new(0.0, 0.0, -0.2),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Twist"));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.source, "erratic-bridge::cmd_vel");
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::DeviceNotFound(DeviceAddress::new(Interface::Power, 0));
        assert_eq!(err.to_string(), "No device registered at power:0");

        let err = BridgeError::InvalidState {
            operation: "start",
            state: "Running".to_string(),
        };
        assert!(err.to_string().contains("start"));
        assert!(err.to_string().contains("Running"));
    }
}
