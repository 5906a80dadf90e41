//! Blocking, bounded, multi-producer / single-consumer message queue.
//!
//! Drivers push data and replies into every queue subscribed to them; one
//! consumer drains it.  Synchronous requests share the same queue: a
//! requester pulls its reply out with [`MessageQueue::wait_response`] while
//! telemetry stays queued in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use erratic_types::{DeviceAddress, Message};
use parking_lot::{Condvar, Mutex};
use tracing::warn;

/// Default number of messages a queue buffers.
pub const DEFAULT_QUEUE_LEN: usize = 32;

struct Inner {
    messages: VecDeque<Message>,
    interrupted: bool,
}

struct Shared {
    capacity: usize,
    inner: Mutex<Inner>,
    available: Condvar,
}

/// Cheaply cloneable handle; all clones refer to the same queue.
#[derive(Clone)]
pub struct MessageQueue {
    shared: Arc<Shared>,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity,
                inner: Mutex::new(Inner {
                    messages: VecDeque::with_capacity(capacity),
                    interrupted: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// `true` when both handles refer to the same underlying queue.
    pub fn same_queue(&self, other: &MessageQueue) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Enqueue `msg` and wake waiters.
    ///
    /// Data is dropped (returning `false`) once the queue is full.  Replies
    /// are always accepted so a backlog of telemetry cannot starve a pending
    /// request.
    pub fn push(&self, msg: Message) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.messages.len() >= self.shared.capacity && !msg.header().msg_type.is_reply() {
            warn!(
                capacity = self.shared.capacity,
                addr = %msg.header().addr,
                subtype = msg.header().subtype,
                "message queue full, dropping message"
            );
            return false;
        }
        inner.messages.push_back(msg);
        self.shared.available.notify_all();
        true
    }

    /// Remove the oldest message, if any.
    pub fn pop(&self) -> Option<Message> {
        self.shared.inner.lock().messages.pop_front()
    }

    /// Block until the queue holds at least one message or
    /// [`interrupt`][Self::interrupt] is called.
    ///
    /// After an interrupt the queue may still be empty; callers must treat
    /// a subsequent `pop() == None` as a normal wake-up.
    pub fn wait(&self) {
        let mut inner = self.shared.inner.lock();
        while inner.messages.is_empty() && !inner.interrupted {
            self.shared.available.wait(&mut inner);
        }
        inner.interrupted = false;
    }

    /// Wake every waiter once without enqueueing anything.
    pub fn interrupt(&self) {
        let mut inner = self.shared.inner.lock();
        inner.interrupted = true;
        self.shared.available.notify_all();
    }

    /// Remove the first reply (`Response` or `Nack`) from `addr` carrying
    /// `subtype`, waiting up to `timeout` for it to arrive.
    ///
    /// Every other message is left in place and in order.
    pub fn wait_response(
        &self,
        addr: DeviceAddress,
        subtype: u8,
        timeout: Duration,
    ) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            let found = inner.messages.iter().position(|m| {
                let h = m.header();
                h.msg_type.is_reply() && h.addr == addr && h.subtype == subtype
            });
            if let Some(idx) = found {
                return inner.messages.remove(idx);
            }
            if self
                .shared
                .available
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_LEN)
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erratic_types::device::subtype;
    use erratic_types::{Interface, MessageHeader, MessageType};
    use std::thread;

    fn msg(msg_type: MessageType, interface: Interface, subtype: u8) -> Message {
        Message::new(
            MessageHeader {
                msg_type,
                subtype,
                addr: DeviceAddress::new(interface, 0),
                timestamp: 0.0,
            },
            Vec::new(),
        )
    }

    fn data(interface: Interface) -> Message {
        msg(MessageType::Data, interface, 1)
    }

    #[test]
    fn fifo_order() {
        let q = MessageQueue::default();
        q.push(data(Interface::Position2d));
        q.push(data(Interface::Power));
        assert_eq!(q.pop().unwrap().header().addr.interface, Interface::Position2d);
        assert_eq!(q.pop().unwrap().header().addr.interface, Interface::Power);
        assert!(q.pop().is_none());
    }

    #[test]
    fn full_queue_drops_data_but_keeps_replies() {
        let q = MessageQueue::new(2);
        assert!(q.push(data(Interface::Power)));
        assert!(q.push(data(Interface::Power)));
        assert!(!q.push(data(Interface::Power)));
        assert!(q.push(msg(
            MessageType::Response,
            Interface::Position2d,
            subtype::position2d::REQ_MOTOR_POWER
        )));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn wait_returns_once_a_producer_pushes() {
        let q = MessageQueue::default();
        let producer = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(data(Interface::Power));
        });
        q.wait();
        assert!(q.pop().is_some());
        handle.join().unwrap();
    }

    #[test]
    fn interrupt_wakes_an_empty_wait() {
        let q = MessageQueue::default();
        let waker = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.interrupt();
        });
        q.wait();
        assert!(q.pop().is_none());
        handle.join().unwrap();
    }

    #[test]
    fn wait_response_skips_data_and_preserves_order() {
        let q = MessageQueue::default();
        q.push(data(Interface::Position2d));
        q.push(msg(
            MessageType::Response,
            Interface::Position2d,
            subtype::position2d::REQ_GET_GEOM,
        ));
        q.push(data(Interface::Power));

        let addr = DeviceAddress::new(Interface::Position2d, 0);
        let reply = q
            .wait_response(addr, subtype::position2d::REQ_GET_GEOM, Duration::from_millis(10))
            .unwrap();
        assert_eq!(reply.header().msg_type, MessageType::Response);

        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().header().addr.interface, Interface::Position2d);
        assert_eq!(q.pop().unwrap().header().addr.interface, Interface::Power);
    }

    #[test]
    fn wait_response_ignores_other_subtypes_and_times_out() {
        let q = MessageQueue::default();
        q.push(msg(
            MessageType::Response,
            Interface::Position2d,
            subtype::position2d::REQ_MOTOR_POWER,
        ));
        let addr = DeviceAddress::new(Interface::Position2d, 0);
        let started = Instant::now();
        let reply = q.wait_response(addr, subtype::position2d::REQ_GET_GEOM, Duration::from_millis(30));
        assert!(reply.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn wait_response_sees_late_reply() {
        let q = MessageQueue::default();
        let producer = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(msg(
                MessageType::Nack,
                Interface::Position2d,
                subtype::position2d::REQ_GET_GEOM,
            ));
        });
        let addr = DeviceAddress::new(Interface::Position2d, 0);
        let reply = q
            .wait_response(addr, subtype::position2d::REQ_GET_GEOM, Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply.header().msg_type, MessageType::Nack);
        handle.join().unwrap();
    }

    #[test]
    fn clones_share_the_queue() {
        let a = MessageQueue::default();
        let b = a.clone();
        assert!(a.same_queue(&b));
        assert!(!a.same_queue(&MessageQueue::default()));
        b.push(data(Interface::Power));
        assert_eq!(a.len(), 1);
    }
}
