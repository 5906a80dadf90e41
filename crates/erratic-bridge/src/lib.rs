//! `erratic-bridge` – Erratic controller ⇄ bus bridge.
//!
//! # Modules
//!
//! - [`bridge`] – [`ErraticBridge`]: device lifecycle (start/stop), the
//!   synchronous motor and geometry requests, and the message pump that turns
//!   queued device data into odometry, transform and battery messages.
//! - [`relay`] – [`CommandRelay`]: forwards bus velocity commands to the
//!   motion device.
//! - [`translate`] – pure conversions between controller payloads and bus
//!   messages, including the voltage-threshold [`PowerPolicy`].
//! - [`lifecycle`] – [`LifecycleState`].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: logging and
//!   optional OTLP span export.

pub mod bridge;
pub mod config;
pub mod lifecycle;
pub mod relay;
pub mod telemetry;
pub mod translate;

pub use bridge::{Dispatch, ErraticBridge, MOTION_ADDR, POWER_ADDR};
pub use config::BridgeConfig;
pub use lifecycle::LifecycleState;
pub use relay::CommandRelay;
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use translate::PowerPolicy;
