// src/events.rs
//! Event channel between the target application and the name register.
//!
//! Object events (children added or removed) and lifecycle events (target
//! started or finished) travel on separate queues so the receiver can always
//! see lifecycle changes first. A `Finished` event must not wait behind a
//! burst of child events that refer to objects which no longer exist.

use crate::remote::{ObjectId, ObjectMapper};
use std::fmt;
use std::str::FromStr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::mpsc;

/// Kind of an event observed on a remote object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    ChildAdded,
    ChildRemoved,
    /// Any other event type reported by the target. Ignored by the register.
    Other(String),
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ChildAdded" => EventKind::ChildAdded,
            "ChildRemoved" => EventKind::ChildRemoved,
            other => EventKind::Other(other.to_string()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::ChildAdded => f.write_str("ChildAdded"),
            EventKind::ChildRemoved => f.write_str("ChildRemoved"),
            EventKind::Other(other) => f.write_str(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEvent {
    pub object: ObjectId,
    pub kind: EventKind,
}

impl RemoteEvent {
    pub fn new(object: ObjectId, kind: EventKind) -> Self {
        Self { object, kind }
    }

    /// Build an event from the raw type string sent by the target.
    pub fn parse(object: ObjectId, kind: &str) -> Self {
        let kind = match kind.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        };
        Self { object, kind }
    }
}

/// Target application lifecycle.
#[derive(Clone, Debug)]
pub enum SystemEvent {
    /// The target is up; handles for this run come from the mapper.
    Started(ObjectMapper),
    /// The target exited.
    Finished,
}

#[derive(Clone, Debug)]
pub enum Event {
    Object(RemoteEvent),
    System(SystemEvent),
}

#[derive(Clone)]
enum ObjectSender {
    Unbounded(mpsc::UnboundedSender<RemoteEvent>),
    Bounded(mpsc::Sender<RemoteEvent>),
}

enum ObjectReceiver {
    Unbounded(mpsc::UnboundedReceiver<RemoteEvent>),
    Bounded(mpsc::Receiver<RemoteEvent>),
}

/// Sending half, cloned into whatever listens to the target.
#[derive(Clone)]
pub struct EventSender {
    tx_object: ObjectSender,
    tx_sys: mpsc::UnboundedSender<SystemEvent>,
    /// Object events currently queued.
    counter: Arc<AtomicUsize>,
}

/// Receiving half, consumed by [`crate::NameRegister::listen`].
pub struct EventReceiver {
    rx_object: ObjectReceiver,
    rx_sys: mpsc::UnboundedReceiver<SystemEvent>,
    counter: Arc<AtomicUsize>,
}

/// Create an unbounded event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx_object, rx_object) = mpsc::unbounded_channel();
    let (tx_sys, rx_sys) = mpsc::unbounded_channel();
    let counter = Arc::new(AtomicUsize::new(0));
    (
        EventSender { tx_object: ObjectSender::Unbounded(tx_object), tx_sys, counter: counter.clone() },
        EventReceiver { rx_object: ObjectReceiver::Unbounded(rx_object), rx_sys, counter },
    )
}

/// Create a channel holding at most `capacity` object events. When full,
/// new object events are rejected (drop-new). Lifecycle events are never
/// rejected while the receiver is alive.
pub fn bounded_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx_object, rx_object) = mpsc::channel(capacity);
    let (tx_sys, rx_sys) = mpsc::unbounded_channel();
    let counter = Arc::new(AtomicUsize::new(0));
    (
        EventSender { tx_object: ObjectSender::Bounded(tx_object), tx_sys, counter: counter.clone() },
        EventReceiver { rx_object: ObjectReceiver::Bounded(rx_object), rx_sys, counter },
    )
}

impl EventSender {
    /// Queue an event, handing it back if it could not be queued.
    pub fn send(&self, event: Event) -> Result<(), Event> {
        match event {
            Event::Object(e) => self.send_object(e).map_err(Event::Object),
            Event::System(s) => self.send_system(s).map_err(Event::System),
        }
    }

    pub fn send_object(&self, event: RemoteEvent) -> Result<(), RemoteEvent> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        let res = match &self.tx_object {
            ObjectSender::Unbounded(tx) => tx.send(event).map_err(|e| e.0),
            ObjectSender::Bounded(tx) => tx.try_send(event).map_err(|err| match err {
                mpsc::error::TrySendError::Full(e) => e,
                mpsc::error::TrySendError::Closed(e) => e,
            }),
        };
        if res.is_err() {
            self.counter.fetch_sub(1, Ordering::SeqCst);
        }
        res
    }

    pub fn send_system(&self, event: SystemEvent) -> Result<(), SystemEvent> {
        self.tx_sys.send(event).map_err(|e| e.0)
    }

    /// Number of object events waiting to be received.
    pub fn len(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventReceiver {
    /// Await the next event, lifecycle events first. Returns `None` once every
    /// sender is gone and both queues are drained.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Ok(sys) = self.rx_sys.try_recv() {
            return Some(Event::System(sys));
        }

        let rx_sys = &mut self.rx_sys;
        let rx_object = &mut self.rx_object;
        let counter = &self.counter;
        let mut sys_open = true;
        loop {
            tokio::select! {
                biased;
                sys = rx_sys.recv(), if sys_open => {
                    match sys {
                        Some(s) => return Some(Event::System(s)),
                        None => sys_open = false,
                    }
                }
                object = async {
                    match &mut *rx_object {
                        ObjectReceiver::Unbounded(rx) => rx.recv().await,
                        ObjectReceiver::Bounded(rx) => rx.recv().await,
                    }
                } => {
                    return object.map(|e| {
                        counter.fetch_sub(1, Ordering::SeqCst);
                        Event::Object(e)
                    });
                }
            }
        }
    }

    /// Receive without waiting; lifecycle events are preferred.
    pub fn try_recv(&mut self) -> Option<Event> {
        if let Ok(sys) = self.rx_sys.try_recv() {
            return Some(Event::System(sys));
        }

        let object = match &mut self.rx_object {
            ObjectReceiver::Unbounded(rx) => rx.try_recv().ok(),
            ObjectReceiver::Bounded(rx) => rx.try_recv().ok(),
        };
        object.map(|e| {
            self.counter.fetch_sub(1, Ordering::SeqCst);
            Event::Object(e)
        })
    }
}
