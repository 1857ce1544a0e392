use std::sync::Mutex;

use tokio::sync::broadcast;

/// User-visible connection state. `Closed` is terminal — a client that has
/// reached it will never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    TlsHandshake,
    InfoHandshake,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Closed)
    }
}

/// How many past transitions a slow subscriber can fall behind before it
/// starts missing them. The actor only ever has one transition in flight
/// at a time, so this is generous headroom, not a sizing knob anyone needs
/// to tune.
const CHANNEL_CAPACITY: usize = 64;

/// Broadcasts every connection state transition, in order. A
/// `tokio::sync::watch` channel only retains the latest value, so two
/// transitions landed back to back (e.g. `InfoHandshake` then `Connected`,
/// both set before a subscriber gets polled again) would silently coalesce
/// into one observed value. `broadcast` keeps every send queued per
/// subscriber instead, so the replay-then-follow contract below actually
/// holds: a new subscriber sees the current state, then every transition
/// after that, none skipped.
#[derive(Debug)]
pub struct StatusBroadcaster {
    current: Mutex<ConnectionStatus>,
    tx: broadcast::Sender<ConnectionStatus>,
}

impl StatusBroadcaster {
    pub fn new(initial: ConnectionStatus) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        StatusBroadcaster {
            current: Mutex::new(initial),
            tx,
        }
    }

    /// Record a transition and publish it. Updating `current` and sending
    /// happen under the same lock that `subscribe` takes, so a subscriber
    /// started concurrently with `set` either sees the old state and then
    /// receives this transition over the channel, or sees the new state
    /// directly — never both, never neither.
    pub fn set(&self, status: ConnectionStatus) {
        let mut current = self.current.lock().expect("status lock poisoned");
        *current = status;
        let _ = self.tx.send(status);
    }

    pub fn current(&self) -> ConnectionStatus {
        *self.current.lock().expect("status lock poisoned")
    }

    pub fn subscribe(&self) -> StatusStream {
        let current = self.current.lock().expect("status lock poisoned");
        let rx = self.tx.subscribe();
        StatusStream {
            rx,
            current: *current,
        }
    }
}

/// A per-subscriber handle on the status stream.
#[derive(Debug)]
pub struct StatusStream {
    rx: broadcast::Receiver<ConnectionStatus>,
    current: ConnectionStatus,
}

impl StatusStream {
    pub fn current(&self) -> ConnectionStatus {
        self.current
    }

    /// Wait until a transition lands on `target`, returning immediately if
    /// the current state already matches it. Also returns if `Closed` is
    /// reached while waiting for some other target, since `Closed` is
    /// terminal and no further transition will ever arrive.
    pub async fn wait_until(&mut self, target: ConnectionStatus) {
        if self.current == target {
            return;
        }
        loop {
            match self.rx.recv().await {
                Ok(status) => {
                    self.current = status;
                    if status == target || status.is_terminal() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Wait for the next transition, whatever it is.
    pub async fn next(&mut self) -> ConnectionStatus {
        loop {
            match self.rx.recv().await {
                Ok(status) => {
                    self.current = status;
                    return status;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.current,
            }
        }
    }
}
