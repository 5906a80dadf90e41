//! [`ErraticBridge`] – lifecycle and message pump.
//!
//! The bridge owns one [`MessageQueue`] shared by the motion (`position2d:0`)
//! and power (`power:0`) devices.  [`ErraticBridge::run`] drains that queue
//! on the calling thread and republishes every recognised sample on the bus,
//! while velocity commands flow the other way through a [`CommandRelay`]
//! executed by the node's dispatch thread.
//!
//! The two threads share nothing but the queue and the device handles, both
//! of which synchronise internally.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use erratic_hal::{Device, DeviceTable, MessageQueue};
use erratic_middleware::{Node, Publisher, Subscription, TransformBroadcaster};
use erratic_types::device::subtype;
use erratic_types::payload::{MotorPowerConfig, Payload, Position2dData, Position2dGeom, PowerData};
use erratic_types::{
    BridgeError, DeviceAddress, EventPayload, Interface, Message, MessageType, Time,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::BridgeConfig;
use crate::lifecycle::LifecycleState;
use crate::relay::CommandRelay;
use crate::translate::{
    PowerPolicy, odometry_from_data, stamp_from_device_time, transform_from_data,
};

/// Address of the motion controller.
pub const MOTION_ADDR: DeviceAddress = DeviceAddress::new(Interface::Position2d, 0);
/// Address of the power monitor.
pub const POWER_ADDR: DeviceAddress = DeviceAddress::new(Interface::Power, 0);

/// What the pump did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Published on the odometry topic and the transform topic.
    Odometry,
    /// Published on the battery topic.
    Power,
    /// Unknown (type, subtype, address); logged and discarded.
    Unhandled,
    /// Known triple but the payload did not decode; logged and discarded.
    Malformed,
}

pub struct ErraticBridge {
    config: BridgeConfig,
    policy: PowerPolicy,
    queue: MessageQueue,
    motion: Arc<dyn Device>,
    power: Arc<dyn Device>,
    state: LifecycleState,
    odom_pub: Publisher,
    battery_pub: Publisher,
    tf: TransformBroadcaster,
    cmd_sub: Option<Subscription>,
    geometry: Option<Position2dGeom>,
}

impl ErraticBridge {
    /// Look up both devices and advertise the outbound topics.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DeviceNotFound`] when either device is missing
    /// from `table`.
    pub fn new(node: &Node, table: &DeviceTable, config: BridgeConfig) -> Result<Self, BridgeError> {
        let motion = table.require(MOTION_ADDR)?;
        let power = table.require(POWER_ADDR)?;
        Ok(Self {
            odom_pub: node.advertise(&config.odometry_topic),
            battery_pub: node.advertise(&config.battery_topic),
            tf: TransformBroadcaster::new(node),
            policy: PowerPolicy::default(),
            queue: MessageQueue::default(),
            motion,
            power,
            state: LifecycleState::Created,
            cmd_sub: None,
            geometry: None,
            config,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The queue the devices deliver into.  Interrupting it wakes a blocked
    /// [`do_update`][Self::do_update].
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Geometry from the last successful [`get_center`][Self::get_center].
    pub fn geometry(&self) -> Option<Position2dGeom> {
        self.geometry
    }

    /// Subscribe motion then power to the queue and start relaying velocity
    /// commands.
    ///
    /// A failed device subscription leaves the bridge in
    /// [`LifecycleState::InitFailed`]; a handle that already subscribed stays
    /// subscribed.  If only the command subscription fails the bridge stays
    /// `Subscribed`, so [`stop`][Self::stop] still releases both devices.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] outside `Created`, otherwise whatever
    /// the failing subscription reported.
    #[instrument(skip_all, fields(port = %self.config.port_name))]
    pub fn start(&mut self, node: &Node) -> Result<(), BridgeError> {
        if self.state != LifecycleState::Created {
            return Err(BridgeError::InvalidState {
                operation: "start",
                state: self.state.to_string(),
            });
        }

        for device in [&self.motion, &self.power] {
            if let Err(e) = device.subscribe(&self.queue) {
                error!(addr = %device.addr(), error = %e, "failed to subscribe device");
                self.state = LifecycleState::InitFailed;
                return Err(e);
            }
            debug!(addr = %device.addr(), "device subscribed");
        }
        self.state = LifecycleState::Subscribed;

        let relay = CommandRelay::new(Arc::clone(&self.motion), self.queue.clone());
        self.cmd_sub = Some(
            node.subscribe(&self.config.cmd_vel_topic, move |event| relay.on_event(&event))?,
        );
        self.state = LifecycleState::Running;
        info!(cmd_vel = %self.config.cmd_vel_topic, "bridge running");
        Ok(())
    }

    /// Unsubscribe both devices, stop relaying commands and give the driver
    /// the grace period to settle.
    ///
    /// Both unsubscriptions are attempted even if the first fails.  Outside
    /// `Subscribed`/`Running` this is a logged no-op.
    ///
    /// # Errors
    ///
    /// The first unsubscribe failure, after the bridge reached `Stopped`.
    #[instrument(skip_all)]
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        if !self.state.holds_subscriptions() {
            info!(state = %self.state, "stop requested with no device subscriptions; nothing to do");
            return Ok(());
        }

        let mut failure = None;
        for device in [&self.motion, &self.power] {
            if let Err(e) = device.unsubscribe(&self.queue) {
                error!(addr = %device.addr(), error = %e, "failed to unsubscribe device");
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
        self.cmd_sub = None;
        thread::sleep(self.config.shutdown_grace);
        self.state = LifecycleState::Stopped;
        info!("bridge stopped");

        failure.map_or(Ok(()), Err)
    }

    /// Switch the motor drivers on or off.  One bounded request.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] unless running, or
    /// [`BridgeError::RequestFailed`] on NACK/timeout.
    pub fn set_motor_state(&self, enable: bool) -> Result<(), BridgeError> {
        self.require_running("set_motor_state")?;
        self.motion.request(
            &self.queue,
            subtype::position2d::REQ_MOTOR_POWER,
            MotorPowerConfig { state: enable }.encode(),
            self.config.request_timeout,
        )?;
        info!(enable, "motor power set");
        Ok(())
    }

    /// Read the robot's center offset and footprint.
    ///
    /// One attempt starts every `geom_retry_interval` until the controller
    /// answers; each attempt waits at most that long for its reply.  There
    /// is no attempt limit.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidState`] unless running.
    #[instrument(skip_all)]
    pub fn get_center(&mut self) -> Result<Position2dGeom, BridgeError> {
        self.require_running("get_center")?;
        let mut attempt: u64 = 0;
        let interval = self.config.geom_retry_interval;
        loop {
            attempt += 1;
            let started = Instant::now();
            let reply = self.motion.request(
                &self.queue,
                subtype::position2d::REQ_GET_GEOM,
                Vec::new(),
                interval,
            );
            match reply.and_then(|msg| msg.decode::<Position2dGeom>()) {
                Ok(geom) => {
                    info!(
                        x = geom.pose.px,
                        y = geom.pose.py,
                        yaw = geom.pose.pa,
                        width = geom.size.sw,
                        length = geom.size.sl,
                        attempt,
                        "robot center"
                    );
                    self.geometry = Some(geom);
                    return Ok(geom);
                }
                Err(e) => {
                    error!(error = %e, attempt, "failed to get geometry; retrying");
                    thread::sleep(interval.saturating_sub(started.elapsed()));
                }
            }
        }
    }

    /// One pump iteration: block until the queue has something, pop one
    /// message and publish it.
    pub fn do_update(&self) -> Option<Dispatch> {
        self.queue.wait();
        let Some(msg) = self.queue.pop() else {
            warn!("message queue woke up empty");
            return None;
        };
        Some(self.dispatch(&msg))
    }

    /// Pump until the node shuts down.
    pub fn run(&self, node: &Node) {
        info!("message pump started");
        while node.ok() {
            self.do_update();
        }
        info!("message pump stopped");
    }

    /// Classify `msg` by (type, subtype, interface) and publish the matching
    /// bus message.  Payloads are only decoded after classification.
    pub fn dispatch(&self, msg: &Message) -> Dispatch {
        let header = msg.header();
        if header.addr == MOTION_ADDR
            && msg.matches(
                MessageType::Data,
                subtype::position2d::DATA_STATE,
                Interface::Position2d,
            )
        {
            self.publish_odometry(msg)
        } else if header.addr == POWER_ADDR
            && msg.matches(MessageType::Data, subtype::power::DATA_STATE, Interface::Power)
        {
            self.publish_power(msg)
        } else {
            warn!(
                msg_type = header.msg_type.code(),
                subtype = header.subtype,
                interface = header.addr.interface.code(),
                index = header.addr.index,
                "unhandled device message"
            );
            Dispatch::Unhandled
        }
    }

    fn publish_odometry(&self, msg: &Message) -> Dispatch {
        let data = match msg.decode::<Position2dData>() {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "dropping odometry sample");
                return Dispatch::Malformed;
            }
        };
        let stamp = stamp_from_device_time(msg.header().timestamp);
        let frame_id = &self.config.odometry_frame_id;

        let odom = odometry_from_data(&data, stamp, frame_id);
        if let Err(e) = self.odom_pub.publish(EventPayload::Odometry(odom)) {
            warn!(error = %e, topic = self.odom_pub.topic(), "failed to publish odometry");
        }
        if let Err(e) = self.tf.send_transform(transform_from_data(&data, stamp, frame_id)) {
            warn!(error = %e, "failed to broadcast odometry transform");
        }
        Dispatch::Odometry
    }

    fn publish_power(&self, msg: &Message) -> Dispatch {
        let data = match msg.decode::<PowerData>() {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "dropping power sample");
                return Dispatch::Malformed;
            }
        };
        // Power samples carry no reliable device time.
        let state = self.policy.power_state(&data, Time::now());
        debug!(volts = data.volts, ac_present = state.ac_present, "battery state");
        if let Err(e) = self.battery_pub.publish(EventPayload::PowerState(state)) {
            warn!(error = %e, topic = self.battery_pub.topic(), "failed to publish battery state");
        }
        Dispatch::Power
    }

    fn require_running(&self, operation: &'static str) -> Result<(), BridgeError> {
        if self.state == LifecycleState::Running {
            Ok(())
        } else {
            Err(BridgeError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }
}
