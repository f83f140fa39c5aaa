//! Observable value cells and event fan-out.
//!
//! [`Signal`] holds one value and pushes every change to its subscribers.
//! [`EventBus`] fans discrete events out to subscribers. Both deliver through
//! unbounded channels, so each change is enqueued at the moment it happens and
//! no transient value is coalesced away.

use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiving end of a [`Signal`] or [`EventBus`] subscription.
///
/// Implements [`Stream`]; dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    fn new(rx: UnboundedReceiver<T>) -> Self {
        Subscription { rx }
    }

    /// Wait for the next value. `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take every value queued so far.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            values.push(value);
        }
        values
    }
}

impl<T> Unpin for Subscription<T> {}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

struct SignalState<T> {
    value: T,
    subscribers: Vec<UnboundedSender<T>>,
}

/// A value cell that notifies subscribers on change.
///
/// New subscribers receive the current value first, then every change in order.
///
/// ```
/// use resource_kit::signal::Signal;
///
/// let flag = Signal::new(false);
/// let mut updates = flag.subscribe();
/// flag.set(true);
/// flag.set(false);
/// assert_eq!(updates.drain(), vec![false, true, false]);
/// ```
pub struct Signal<T> {
    state: Mutex<SignalState<T>>,
}

impl<T: Clone + PartialEq> Signal<T> {
    pub fn new(value: T) -> Self {
        Signal {
            state: Mutex::new(SignalState {
                value,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.state.lock().value.clone()
    }

    /// Replace the value. Returns `false` (and notifies nobody) if unchanged.
    pub fn set(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.value == value {
            return false;
        }
        state.value = value.clone();
        state
            .subscribers
            .retain(|tx| tx.send(value.clone()).is_ok());
        true
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let mut state = self.state.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive, so this cannot fail.
        let _ = tx.send(state.value.clone());
        state.subscribers.push(tx);
        Subscription::new(rx)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }
}

/// Fan-out of discrete events to any number of subscribers.
pub struct EventBus<E> {
    subscribers: Mutex<Vec<UnboundedSender<E>>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        EventBus {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Deliver an event to every live subscriber, returning how many got it.
    pub fn emit(&self, event: E) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Subscription::new(rx)
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
