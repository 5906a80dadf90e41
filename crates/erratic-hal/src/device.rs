//! [`Device`] – one addressable endpoint inside a driver, and [`Driver`] –
//! the thing that provides devices.
//!
//! The bridge only ever talks to these traits, so a serial-port driver and
//! the in-memory [`SimErratic`][crate::sim::SimErratic] are interchangeable.

use std::sync::Arc;
use std::time::Duration;

use erratic_types::{BridgeError, DeviceAddress, Message, MessageType};

use crate::queue::MessageQueue;

/// An addressable device (motion controller, power monitor, …).
///
/// Implementations synchronise internally: `put_msg` may be called from one
/// thread while another subscribes or drains the queue.
pub trait Device: Send + Sync {
    /// The address this device was registered under.
    fn addr(&self) -> DeviceAddress;

    /// Start delivering this device's data into `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Subscribe`] if the driver refuses the
    /// subscription (e.g. the hardware did not come up).
    fn subscribe(&self, queue: &MessageQueue) -> Result<(), BridgeError>;

    /// Stop delivering data into `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unsubscribe`] if `queue` was not subscribed or
    /// the driver failed to shut down.
    fn unsubscribe(&self, queue: &MessageQueue) -> Result<(), BridgeError>;

    /// Hand a message to the driver without waiting for it to be processed.
    /// Any reply is pushed into `queue`.
    fn put_msg(
        &self,
        queue: &MessageQueue,
        msg_type: MessageType,
        subtype: u8,
        payload: Vec<u8>,
    ) -> Result<(), BridgeError>;

    /// Send a request and block until the matching reply lands in `queue`
    /// or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RequestFailed`] when the driver answers with a
    /// NACK or no reply arrives in time.
    fn request(
        &self,
        queue: &MessageQueue,
        subtype: u8,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Message, BridgeError> {
        let addr = self.addr();
        self.put_msg(queue, MessageType::Request, subtype, payload)?;
        match queue.wait_response(addr, subtype, timeout) {
            Some(reply) if reply.header().msg_type == MessageType::Response => Ok(reply),
            Some(_) => Err(BridgeError::RequestFailed {
                addr,
                subtype,
                details: "driver answered NACK".to_string(),
            }),
            None => Err(BridgeError::RequestFailed {
                addr,
                subtype,
                details: format!("no reply within {timeout:?}"),
            }),
        }
    }
}

/// A loaded driver: owns its devices and knows how to stop them.
pub trait Driver: Send + Sync {
    /// Short name used in logs, e.g. `"erratic-sim"`.
    fn name(&self) -> &str;

    /// Every device this driver provides.
    fn devices(&self) -> Vec<Arc<dyn Device>>;

    /// Stop background work and drop all subscriptions.
    fn shutdown(&self);
}
