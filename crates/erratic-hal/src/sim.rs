//! [`SimErratic`] – in-memory stand-in for the Erratic motion controller.
//!
//! Provides `position2d:0` and `power:0`.  While at least one queue is
//! subscribed a ticker thread integrates a unicycle model from the last
//! velocity command and streams odometry and battery voltage to subscribers.
//! Every command received is recorded in order so tests can inspect exactly
//! what the device observed.
//!
//! # Stub behaviour
//!
//! | Message | Reaction |
//! |---|---|
//! | COMMAND `CMD_VEL` | Recorded; becomes the active set-point when its enable flag is set. |
//! | REQUEST `MOTOR_POWER` | Enables/disables the motors, answers RESPONSE. |
//! | REQUEST `GET_GEOM` | NACKs the first `nack_geom_requests` times, then answers the configured geometry. |
//! | any other REQUEST | NACK. |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use erratic_types::device::subtype;
use erratic_types::payload::{
    MotorPowerConfig, Payload, Pose2d, Position2dCmdVel, Position2dData, Position2dGeom, PowerData,
    Size2d,
};
use erratic_types::{BridgeError, DeviceAddress, Interface, Message, MessageHeader, MessageType};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::device::{Device, Driver};
use crate::queue::MessageQueue;

/// Tunables for the simulated controller.
#[derive(Debug, Clone)]
pub struct SimSettings {
    /// Period of the telemetry ticker.
    pub tick: Duration,
    /// Battery voltage reported on `power:0`.
    pub voltage: f32,
    /// Answer to `GET_GEOM`.
    pub geometry: Position2dGeom,
    /// Number of initial `GET_GEOM` requests answered with NACK.
    pub nack_geom_requests: u32,
    /// Make `subscribe` fail on the device with this interface.
    pub fail_subscribe: Option<Interface>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            voltage: 12.6,
            geometry: Position2dGeom {
                pose: Pose2d::new(-0.04, 0.0, 0.0),
                size: Size2d { sw: 0.38, sl: 0.40 },
            },
            nack_geom_requests: 0,
            fail_subscribe: None,
        }
    }
}

#[derive(Default)]
struct SimState {
    pose: Pose2d,
    setpoint: Pose2d,
    motors_enabled: bool,
    voltage: f32,
    commands: Vec<Position2dCmdVel>,
    geom_requests: u32,
    motion_subs: Vec<MessageQueue>,
    power_subs: Vec<MessageQueue>,
}

impl SimState {
    fn subs_mut(&mut self, interface: Interface) -> &mut Vec<MessageQueue> {
        match interface {
            Interface::Position2d => &mut self.motion_subs,
            Interface::Power => &mut self.power_subs,
        }
    }

    fn has_subscribers(&self) -> bool {
        !self.motion_subs.is_empty() || !self.power_subs.is_empty()
    }
}

struct SimCore {
    settings: SimSettings,
    state: Mutex<SimState>,
    running: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

fn device_clock() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}

fn reply(msg_type: MessageType, subtype: u8, addr: DeviceAddress, payload: Vec<u8>) -> Message {
    Message::new(
        MessageHeader {
            msg_type,
            subtype,
            addr,
            timestamp: device_clock(),
        },
        payload,
    )
}

impl SimCore {
    fn ensure_ticker(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        let core = Arc::clone(self);
        *ticker = Some(thread::spawn(move || core.run_ticker()));
        debug!("sim ticker started");
    }

    fn stop_ticker(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.ticker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("sim ticker thread panicked");
            }
            debug!("sim ticker stopped");
        }
    }

    fn run_ticker(&self) {
        let dt = self.settings.tick.as_secs_f64();
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(self.settings.tick);
            let (odom, power, motion_subs, power_subs) = {
                let mut state = self.state.lock();
                let vel = if state.motors_enabled {
                    state.setpoint
                } else {
                    Pose2d::default()
                };
                state.pose.pa += vel.pa * dt;
                state.pose.px += vel.px * state.pose.pa.cos() * dt;
                state.pose.py += vel.px * state.pose.pa.sin() * dt;
                let odom = Position2dData {
                    pos: state.pose,
                    vel,
                    stall: false,
                };
                let power = PowerData {
                    volts: state.voltage,
                };
                (odom, power, state.motion_subs.clone(), state.power_subs.clone())
            };

            let stamp = device_clock();
            let motion_addr = DeviceAddress::new(Interface::Position2d, 0);
            let power_addr = DeviceAddress::new(Interface::Power, 0);
            for q in &motion_subs {
                q.push(Message::new(
                    MessageHeader {
                        msg_type: MessageType::Data,
                        subtype: subtype::position2d::DATA_STATE,
                        addr: motion_addr,
                        timestamp: stamp,
                    },
                    odom.encode(),
                ));
            }
            for q in &power_subs {
                q.push(Message::new(
                    MessageHeader {
                        msg_type: MessageType::Data,
                        subtype: subtype::power::DATA_STATE,
                        addr: power_addr,
                        timestamp: stamp,
                    },
                    power.encode(),
                ));
            }
        }
    }

    fn handle_position2d(
        &self,
        addr: DeviceAddress,
        queue: &MessageQueue,
        msg_type: MessageType,
        code: u8,
        payload: &[u8],
    ) -> Result<(), BridgeError> {
        match (msg_type, code) {
            (MessageType::Command, subtype::position2d::CMD_VEL) => {
                let cmd = Position2dCmdVel::decode(payload)?;
                let mut state = self.state.lock();
                state.commands.push(cmd);
                if cmd.state {
                    state.setpoint = cmd.vel;
                }
                Ok(())
            }
            (MessageType::Request, subtype::position2d::REQ_MOTOR_POWER) => {
                let cfg = MotorPowerConfig::decode(payload)?;
                self.state.lock().motors_enabled = cfg.state;
                info!(enabled = cfg.state, "sim motor power changed");
                queue.push(reply(MessageType::Response, code, addr, Vec::new()));
                Ok(())
            }
            (MessageType::Request, subtype::position2d::REQ_GET_GEOM) => {
                let attempt = {
                    let mut state = self.state.lock();
                    state.geom_requests += 1;
                    state.geom_requests
                };
                if attempt <= self.settings.nack_geom_requests {
                    queue.push(reply(MessageType::Nack, code, addr, Vec::new()));
                } else {
                    queue.push(reply(
                        MessageType::Response,
                        code,
                        addr,
                        self.settings.geometry.encode(),
                    ));
                }
                Ok(())
            }
            (MessageType::Request, _) => {
                queue.push(reply(MessageType::Nack, code, addr, Vec::new()));
                Ok(())
            }
            _ => {
                warn!(%addr, %msg_type, subtype = code, "sim ignoring unsupported message");
                Ok(())
            }
        }
    }
}

/// One of the two devices exposed by [`SimErratic`].
struct SimDevice {
    addr: DeviceAddress,
    core: Arc<SimCore>,
}

impl Device for SimDevice {
    fn addr(&self) -> DeviceAddress {
        self.addr
    }

    fn subscribe(&self, queue: &MessageQueue) -> Result<(), BridgeError> {
        if self.core.settings.fail_subscribe == Some(self.addr.interface) {
            return Err(BridgeError::Subscribe {
                addr: self.addr,
                details: "simulated setup failure".to_string(),
            });
        }
        {
            let mut state = self.core.state.lock();
            let subs = state.subs_mut(self.addr.interface);
            if !subs.iter().any(|q| q.same_queue(queue)) {
                subs.push(queue.clone());
            }
        }
        self.core.ensure_ticker();
        Ok(())
    }

    fn unsubscribe(&self, queue: &MessageQueue) -> Result<(), BridgeError> {
        let idle = {
            let mut state = self.core.state.lock();
            let subs = state.subs_mut(self.addr.interface);
            let Some(idx) = subs.iter().position(|q| q.same_queue(queue)) else {
                return Err(BridgeError::Unsubscribe {
                    addr: self.addr,
                    details: "queue was not subscribed".to_string(),
                });
            };
            subs.remove(idx);
            !state.has_subscribers()
        };
        if idle {
            self.core.stop_ticker();
        }
        Ok(())
    }

    fn put_msg(
        &self,
        queue: &MessageQueue,
        msg_type: MessageType,
        subtype: u8,
        payload: Vec<u8>,
    ) -> Result<(), BridgeError> {
        match self.addr.interface {
            Interface::Position2d => {
                self.core
                    .handle_position2d(self.addr, queue, msg_type, subtype, &payload)
            }
            Interface::Power => {
                if msg_type == MessageType::Request {
                    queue.push(reply(MessageType::Nack, subtype, self.addr, Vec::new()));
                }
                Ok(())
            }
        }
    }
}

/// Simulated differential-drive controller.
pub struct SimErratic {
    core: Arc<SimCore>,
    motion: Arc<SimDevice>,
    power: Arc<SimDevice>,
}

impl SimErratic {
    pub fn new(settings: SimSettings) -> Self {
        let core = Arc::new(SimCore {
            state: Mutex::new(SimState {
                voltage: settings.voltage,
                ..SimState::default()
            }),
            settings,
            running: AtomicBool::new(false),
            ticker: Mutex::new(None),
        });
        let motion = Arc::new(SimDevice {
            addr: DeviceAddress::new(Interface::Position2d, 0),
            core: Arc::clone(&core),
        });
        let power = Arc::new(SimDevice {
            addr: DeviceAddress::new(Interface::Power, 0),
            core: Arc::clone(&core),
        });
        Self {
            core,
            motion,
            power,
        }
    }

    /// Build the driver from its parameter block.
    ///
    /// Reads every `provides` entry; both `position2d:0` and `power:0` must
    /// be requested.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DriverInit`] when `provides` is missing, names
    /// an unparsable address, or asks for a device this driver cannot offer.
    pub fn from_config(config: &DriverConfig, settings: SimSettings) -> Result<Self, BridgeError> {
        let provides = config.values("provides");
        if provides.is_empty() {
            return Err(BridgeError::DriverInit(
                "no 'provides' entries in driver config".to_string(),
            ));
        }
        let sim = Self::new(settings);
        let offered = [sim.motion.addr, sim.power.addr];
        let mut requested = Vec::with_capacity(provides.len());
        for raw in provides {
            let addr: DeviceAddress = raw
                .parse()
                .map_err(|e: BridgeError| BridgeError::DriverInit(e.to_string()))?;
            if !offered.contains(&addr) {
                return Err(BridgeError::DriverInit(format!(
                    "erratic-sim cannot provide {addr}"
                )));
            }
            requested.push(addr);
        }
        for addr in offered {
            if !requested.contains(&addr) {
                return Err(BridgeError::DriverInit(format!(
                    "erratic-sim requires {addr} in 'provides'"
                )));
            }
        }
        Ok(sim)
    }

    pub fn motion(&self) -> Arc<dyn Device> {
        self.motion.clone()
    }

    pub fn power(&self) -> Arc<dyn Device> {
        self.power.clone()
    }

    /// Every velocity command received so far, in arrival order.
    pub fn commands(&self) -> Vec<Position2dCmdVel> {
        self.core.state.lock().commands.clone()
    }

    pub fn motors_enabled(&self) -> bool {
        self.core.state.lock().motors_enabled
    }

    pub fn pose(&self) -> Pose2d {
        self.core.state.lock().pose
    }

    pub fn set_voltage(&self, volts: f32) {
        self.core.state.lock().voltage = volts;
    }

    /// Number of queues currently subscribed to `interface`.
    pub fn subscriber_count(&self, interface: Interface) -> usize {
        self.core.state.lock().subs_mut(interface).len()
    }
}

impl Driver for SimErratic {
    fn name(&self) -> &str {
        "erratic-sim"
    }

    fn devices(&self) -> Vec<Arc<dyn Device>> {
        vec![self.motion(), self.power()]
    }

    fn shutdown(&self) {
        {
            let mut state = self.core.state.lock();
            state.motion_subs.clear();
            state.power_subs.clear();
        }
        self.core.stop_ticker();
    }
}

impl Drop for SimErratic {
    fn drop(&mut self) {
        self.core.stop_ticker();
    }
}
