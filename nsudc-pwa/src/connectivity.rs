//! Connectivity observation.
//!
//! Stands in for the host's `online`/`offline` events. Observers hand out
//! [`Subscription`]s; the session drains its subscription from the host's
//! event loop rather than being called back re-entrantly.

use std::cell::{Cell, RefCell};
use std::sync::mpsc::{channel, Receiver, Sender};

use log::debug;

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Online,
    Offline,
}

/// Handle identifying one subscription on its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a state-change subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: Receiver<NetworkState>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Every state change delivered since the last call, oldest first.
    pub fn pending(&self) -> Vec<NetworkState> {
        self.rx.try_iter().collect()
    }

    /// Whether the connection came back since the last call.
    pub fn consume_online_transition(&self) -> bool {
        self.pending().contains(&NetworkState::Online)
    }
}

/// Host capability: report connectivity and notify on change.
pub trait ConnectivityObserver {
    /// The environment's current belief (`navigator.onLine`).
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> Subscription;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Observer for platforms without connectivity events: always online,
/// never notifies.
#[derive(Debug, Default)]
pub struct NoConnectivityEvents;

impl ConnectivityObserver for NoConnectivityEvents {
    fn is_online(&self) -> bool {
        true
    }

    fn subscribe(&self) -> Subscription {
        let (_tx, rx) = channel();
        Subscription {
            id: SubscriptionId(0),
            rx,
        }
    }

    fn unsubscribe(&self, _id: SubscriptionId) {}
}

/// In-process observer whose state is set by the host (or a test).
///
/// Only actual changes are broadcast; setting the current state again is a
/// no-op.
#[derive(Debug)]
pub struct ManualConnectivity {
    state: Cell<NetworkState>,
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Sender<NetworkState>)>>,
}

impl ManualConnectivity {
    pub fn new(initial: NetworkState) -> Self {
        Self {
            state: Cell::new(initial),
            next_id: Cell::new(1),
            subscribers: RefCell::new(Vec::new()),
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state.get()
    }

    pub fn set_state(&self, state: NetworkState) {
        if self.state.replace(state) == state {
            return;
        }
        debug!("connectivity: now {state:?}");
        // Drop subscribers whose receiving end is gone.
        self.subscribers
            .borrow_mut()
            .retain(|(_, tx)| tx.send(state).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

impl ConnectivityObserver for ManualConnectivity {
    fn is_online(&self) -> bool {
        self.state.get() == NetworkState::Online
    }

    fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let (tx, rx) = channel();
        self.subscribers.borrow_mut().push((id, tx));
        Subscription { id, rx }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
    }
}
