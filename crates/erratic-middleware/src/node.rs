//! [`Node`] – a named participant on the [`EventBus`].
//!
//! A node hands out [`Publisher`]s for outbound topics and registers
//! callbacks for inbound ones.  Callbacks never run on the subscribing
//! thread: they are queued for the dispatch loop and executed by whichever
//! thread calls [`Node::spin`], one event at a time and in arrival order per
//! topic.  `spin` keeps going until [`Node::shutdown`] is called.
//!
//! ```text
//!   subscribe(topic, cb) ──► registration channel ──► spin() thread
//!                                                      │  current-thread runtime
//!   EventBus topic ──────────────────────────────────► ├─ task: recv → cb(event)
//!                                                      └─ task: …
//! ```

use std::sync::Arc;

use erratic_types::{BridgeError, Event, EventPayload};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, TopicReceiver};

type Callback = Box<dyn FnMut(Event) + Send + 'static>;

struct Registration {
    receiver: TopicReceiver,
    callback: Callback,
    cancelled: oneshot::Receiver<()>,
}

impl Registration {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = &mut self.cancelled => break,
                event = self.receiver.recv() => match event {
                    Some(event) => (self.callback)(event),
                    None => break,
                },
            }
        }
        debug!(topic = self.receiver.topic(), "subscription finished");
    }
}

struct NodeShared {
    registrations: mpsc::UnboundedSender<Registration>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<Registration>>>,
    shutdown: watch::Sender<bool>,
}

/// Cheap to clone; every clone refers to the same node.
#[derive(Clone)]
pub struct Node {
    name: String,
    bus: EventBus,
    shared: Arc<NodeShared>,
}

impl Node {
    pub fn new(name: impl Into<String>, bus: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            name: name.into(),
            bus,
            shared: Arc::new(NodeShared {
                registrations: tx,
                pending: Mutex::new(Some(rx)),
                shutdown,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Publisher handle for `topic`.
    pub fn advertise(&self, topic: &str) -> Publisher {
        debug!(node = %self.name, topic, "advertising");
        Publisher {
            topic: topic.to_string(),
            source: format!("{}::{}", self.name, topic),
            bus: self.bus.clone(),
        }
    }

    /// Run `callback` for every event published on `topic` from now on.
    ///
    /// The callback executes on the [`spin`][Self::spin] thread.  Dropping
    /// the returned [`Subscription`] cancels it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] once the dispatch loop has exited.
    pub fn subscribe<F>(&self, topic: &str, callback: F) -> Result<Subscription, BridgeError>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let (cancel, cancelled) = oneshot::channel();
        let registration = Registration {
            receiver: self.bus.subscribe_to(topic),
            callback: Box::new(callback),
            cancelled,
        };
        self.shared.registrations.send(registration).map_err(|_| {
            BridgeError::Channel(format!("dispatch loop of node '{}' has exited", self.name))
        })?;
        info!(node = %self.name, topic, "subscribed");
        Ok(Subscription {
            topic: topic.to_string(),
            cancel: Some(cancel),
        })
    }

    /// `false` once shutdown has been requested.
    pub fn ok(&self) -> bool {
        !*self.shared.shutdown.borrow()
    }

    /// Ask the dispatch loop to stop.  Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.send_replace(true) {
            info!(node = %self.name, "shutdown requested");
        }
    }

    /// Dispatch subscription callbacks on the calling thread until
    /// [`shutdown`][Self::shutdown].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Channel`] if the node is already spinning
    /// elsewhere or the runtime cannot be built.
    pub fn spin(&self) -> Result<(), BridgeError> {
        let mut registrations = self.shared.pending.lock().take().ok_or_else(|| {
            BridgeError::Channel(format!("node '{}' is already spinning", self.name))
        })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Channel(format!("failed to build dispatch runtime: {e}")))?;
        let mut shutdown = self.shared.shutdown.subscribe();

        info!(node = %self.name, "dispatch loop started");
        runtime.block_on(async {
            let mut tasks = JoinSet::new();
            while !*shutdown.borrow_and_update() {
                tokio::select! {
                    registration = registrations.recv() => match registration {
                        Some(registration) => {
                            tasks.spawn(registration.run());
                        }
                        None => break,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    Some(joined) = tasks.join_next() => {
                        if let Err(e) = joined {
                            warn!(error = %e, "subscription task failed");
                        }
                    }
                }
            }
            tasks.shutdown().await;
        });
        info!(node = %self.name, "dispatch loop stopped");
        Ok(())
    }
}

/// Outbound handle for one topic.
#[derive(Clone, Debug)]
pub struct Publisher {
    topic: String,
    source: String,
    bus: EventBus,
}

impl Publisher {
    /// Wrap `payload` in an [`Event`] and publish it.  Returns the number of
    /// subscribers reached.
    pub fn publish(&self, payload: EventPayload) -> Result<usize, BridgeError> {
        self.bus
            .publish_to(&self.topic, Event::new(self.source.clone(), payload))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Live callback registration.  Cancelled on drop.
pub struct Subscription {
    topic: String,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
            debug!(topic = %self.topic, "subscription cancelled");
        }
    }
}
