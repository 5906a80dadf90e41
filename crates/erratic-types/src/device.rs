//! Device-framework message model.
//!
//! Every message exchanged with a driver is a [`Message`]: a
//! [`MessageHeader`] discriminated by `(type, subtype, interface)` plus an
//! opaque payload.  The payload layout is only known once the triple has been
//! classified, so [`Message::decode`] is the sole way to interpret the bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BridgeError;
use crate::payload::Payload;

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Asynchronous telemetry pushed by a driver.
    Data,
    /// Fire-and-forget command to a driver.
    Command,
    /// Synchronous query; answered by `Response` or `Nack`.
    Request,
    /// Positive answer to a `Request`.
    Response,
    /// Negative answer: the driver could not honour the request.
    Nack,
}

impl MessageType {
    /// Numeric code used in log lines.
    pub const fn code(self) -> u8 {
        match self {
            MessageType::Data => 1,
            MessageType::Command => 2,
            MessageType::Request => 3,
            MessageType::Response => 4,
            MessageType::Nack => 6,
        }
    }

    /// `true` for the two kinds that answer a request.
    pub const fn is_reply(self) -> bool {
        matches!(self, MessageType::Response | MessageType::Nack)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Data => "DATA",
            MessageType::Command => "COMMAND",
            MessageType::Request => "REQUEST",
            MessageType::Response => "RESPONSE",
            MessageType::Nack => "NACK",
        };
        f.write_str(name)
    }
}

/// Capability kind a device provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interface {
    /// Planar motion controller: odometry in, velocity commands out.
    Position2d,
    /// Power monitor: battery voltage.
    Power,
}

impl Interface {
    pub const fn code(self) -> u16 {
        match self {
            Interface::Position2d => 4,
            Interface::Power => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Interface::Position2d => "position2d",
            Interface::Power => "power",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "position2d" => Some(Interface::Position2d),
            "power" => Some(Interface::Power),
            _ => None,
        }
    }
}

/// `(interface, index)` pair identifying one device inside a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub interface: Interface,
    pub index: u16,
}

impl DeviceAddress {
    pub const fn new(interface: Interface, index: u16) -> Self {
        Self { interface, index }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.interface.name(), self.index)
    }
}

impl FromStr for DeviceAddress {
    type Err = BridgeError;

    /// Parse the `interface:index` form, e.g. `"position2d:0"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidAddress(s.to_string());
        let (name, index) = s.split_once(':').ok_or_else(invalid)?;
        let interface = Interface::from_name(name.trim()).ok_or_else(invalid)?;
        let index = index.trim().parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(interface, index))
    }
}

/// Subtype codes, scoped per interface.
pub mod subtype {
    pub mod position2d {
        /// DATA: pose, velocity and stall flag.
        pub const DATA_STATE: u8 = 1;
        /// DATA: robot geometry.
        pub const DATA_GEOM: u8 = 2;
        /// COMMAND: velocity set-point.
        pub const CMD_VEL: u8 = 1;
        /// REQUEST: fetch geometry.
        pub const REQ_GET_GEOM: u8 = 1;
        /// REQUEST: enable or disable the motors.
        pub const REQ_MOTOR_POWER: u8 = 2;
    }

    pub mod power {
        /// DATA: battery voltage.
        pub const DATA_STATE: u8 = 1;
    }
}

/// Routing information attached to every [`Message`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageHeader {
    pub msg_type: MessageType,
    pub subtype: u8,
    /// Source device for data and replies, target device for commands and
    /// requests.
    pub addr: DeviceAddress,
    /// Device clock, seconds.
    pub timestamp: f64,
}

/// A discriminated envelope around an opaque payload.
#[derive(Debug, Clone)]
pub struct Message {
    header: MessageHeader,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(header: MessageHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// `true` when the header carries exactly this triple.
    pub fn matches(&self, msg_type: MessageType, subtype: u8, interface: Interface) -> bool {
        self.header.msg_type == msg_type
            && self.header.subtype == subtype
            && self.header.addr.interface == interface
    }

    /// Interpret the payload as `P`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Decode`] when the payload length does not match
    /// the layout of `P`.
    pub fn decode<P: Payload>(&self) -> Result<P, BridgeError> {
        P::decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PowerData;

    #[test]
    fn address_display_and_parse() {
        let addr: DeviceAddress = "position2d:0".parse().unwrap();
        assert_eq!(addr, DeviceAddress::new(Interface::Position2d, 0));
        assert_eq!(addr.to_string(), "position2d:0");

        let addr: DeviceAddress = "power:3".parse().unwrap();
        assert_eq!(addr.index, 3);
    }

    #[test]
    fn address_parse_rejects_garbage() {
        for bad in ["", "position2d", "laser:0", "power:x", "power:-1"] {
            assert!(
                matches!(bad.parse::<DeviceAddress>(), Err(BridgeError::InvalidAddress(_))),
                "'{bad}' should not parse"
            );
        }
    }

    #[test]
    fn matches_checks_the_whole_triple() {
        let msg = Message::new(
            MessageHeader {
                msg_type: MessageType::Data,
                subtype: subtype::power::DATA_STATE,
                addr: DeviceAddress::new(Interface::Power, 0),
                timestamp: 0.0,
            },
            PowerData { volts: 12.5 }.encode(),
        );
        assert!(msg.matches(MessageType::Data, subtype::power::DATA_STATE, Interface::Power));
        assert!(!msg.matches(MessageType::Data, subtype::power::DATA_STATE, Interface::Position2d));
        assert!(!msg.matches(MessageType::Response, subtype::power::DATA_STATE, Interface::Power));
    }

    #[test]
    fn reply_kinds() {
        assert!(MessageType::Response.is_reply());
        assert!(MessageType::Nack.is_reply());
        assert!(!MessageType::Data.is_reply());
        assert_eq!(MessageType::Data.to_string(), "DATA");
    }
}
