use std::collections::VecDeque;
use tokio::sync::oneshot;

/// FIFO of outstanding ack-expecting commands. In verbose mode the server
/// answers every command with exactly one `+OK`/`-ERR`, in the order the
/// commands were sent; `complete_next` drains this queue in lockstep with
/// those replies. A broadcast channel (the source's original design, per
/// the design notes) can't guarantee that ordering under concurrent
/// callers, so we hold a literal FIFO of one-shot completers instead.
#[derive(Default)]
pub struct AckQueue {
    waiters: VecDeque<oneshot::Sender<bool>>,
}

impl AckQueue {
    pub fn new() -> Self {
        AckQueue::default()
    }

    /// Register interest in the next ack, returning the receiver half.
    pub fn register(&mut self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        rx
    }

    /// Complete the oldest outstanding waiter with `ok`. A `+OK`/`-ERR`
    /// with nobody waiting (verbose mode off, or a stray reply) is
    /// dropped.
    pub fn complete_next(&mut self, ok: bool) {
        if let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.send(ok);
        }
    }

    /// Fail every outstanding waiter, e.g. on transport loss. Draining
    /// here (rather than leaving receivers to observe a dropped sender)
    /// keeps the failure mode explicit at the call site.
    pub fn fail_all(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.send(false);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
