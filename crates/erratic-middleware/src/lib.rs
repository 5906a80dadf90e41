//! `erratic-middleware` – the bus side of the bridge.
//!
//! # Modules
//!
//! - [`bus`] – Named-topic publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`node`] – Publisher/subscriber handles plus the dispatch loop that runs
//!   subscription callbacks.
//! - [`tf`] – Coordinate-transform broadcaster.

pub mod bus;
pub mod node;
pub mod tf;

pub use bus::{EventBus, TopicReceiver};
pub use node::{Node, Publisher, Subscription};
pub use tf::{TF_TOPIC, TransformBroadcaster};
