//! [`CommandRelay`] – bus velocity commands to device commands.
//!
//! Runs on the bus dispatch thread.  Each command is handed straight to the
//! motion device with `put_msg`; nothing is coalesced, so the device sees
//! every command in the order the bus delivered it.

use std::sync::Arc;

use erratic_hal::{Device, MessageQueue};
use erratic_types::device::subtype;
use erratic_types::payload::Payload;
use erratic_types::{BridgeError, Event, EventPayload, MessageType, Twist};
use tracing::{debug, warn};

use crate::translate::cmd_from_twist;

pub struct CommandRelay {
    motion: Arc<dyn Device>,
    queue: MessageQueue,
}

impl CommandRelay {
    pub fn new(motion: Arc<dyn Device>, queue: MessageQueue) -> Self {
        Self { motion, queue }
    }

    /// Send one velocity command to the motion device.
    pub fn forward(&self, twist: &Twist) -> Result<(), BridgeError> {
        let cmd = cmd_from_twist(twist);
        debug!(vx = cmd.vel.px, va = cmd.vel.pa, "relaying velocity command");
        self.motion.put_msg(
            &self.queue,
            MessageType::Command,
            subtype::position2d::CMD_VEL,
            cmd.encode(),
        )
    }

    /// Subscription callback body.
    pub fn on_event(&self, event: &Event) {
        match &event.payload {
            EventPayload::Twist(twist) => {
                if let Err(e) = self.forward(twist) {
                    warn!(error = %e, source = %event.source, "failed to relay velocity command");
                }
            }
            _ => warn!(source = %event.source, "ignoring non-twist event on command topic"),
        }
    }
}
