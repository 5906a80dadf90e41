//! `erratic-hal` – the device framework the bridge talks to.
//!
//! # Modules
//!
//! - [`queue`] – [`MessageQueue`]: blocking FIFO shared by every device a
//!   consumer subscribes to, with request/response demultiplexing.
//! - [`device`] – the [`Device`] and [`Driver`] traits.
//! - [`table`] – [`DeviceTable`]: address-keyed device lookup.
//! - [`config`] – [`DriverConfig`]: key/value parameters handed to a driver.
//! - [`runtime`] – [`DriverRuntime`]: process-wide driver globals, torn down
//!   on drop.
//! - [`sim`] – [`SimErratic`]: in-memory differential-drive controller used
//!   in tests and headless runs.

pub mod config;
pub mod device;
pub mod queue;
pub mod runtime;
pub mod sim;
pub mod table;

pub use config::DriverConfig;
pub use device::{Device, Driver};
pub use queue::MessageQueue;
pub use runtime::DriverRuntime;
pub use sim::{SimErratic, SimSettings};
pub use table::DeviceTable;
