use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use pubsub_wire::{ClientOp, Sid, Subject};
use tokio::sync::mpsc;

use crate::message::Message;

/// The receiving half of a subscription; what `subscribe` hands back to
/// callers. Dropping it (or calling [`Subscription::unsubscribe`]) tears
/// down the registry entry.
pub struct Subscription {
    pub sid: Sid,
    pub subject: Subject,
    pub queue_group: Option<String>,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    /// Receive the next message, or `None` once the sink has been closed
    /// (the subscription was removed, or the client closed).
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

struct Entry {
    subject: Subject,
    queue_group: Option<String>,
    sink: mpsc::Sender<Message>,
    installed_on_server: bool,
}

/// Maps `sid ⇄ Subscription` and tracks which of those are currently
/// installed on the live connection. Not thread-safe on its own — callers
/// serialize access the same way the rest of the event loop does (see the
/// design notes on the single-writer/single-reader model).
pub struct Registry {
    next_sid: AtomicU64,
    entries: HashMap<Sid, Entry>,
    sink_capacity: usize,
}

impl Registry {
    pub fn new(sink_capacity: usize) -> Self {
        Registry {
            next_sid: AtomicU64::new(1),
            entries: HashMap::new(),
            sink_capacity,
        }
    }

    fn allocate_sid(&self) -> Sid {
        self.next_sid.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a new subscription. Returns the handle given to the
    /// caller and, if `connected` is true, the `SUB` op to send immediately
    /// (the registry itself never touches the transport).
    pub fn subscribe(
        &mut self,
        subject: Subject,
        queue_group: Option<String>,
        connected: bool,
    ) -> (Subscription, Option<ClientOp>) {
        let sid = self.allocate_sid();
        let (tx, rx) = mpsc::channel(self.sink_capacity);
        self.entries.insert(
            sid,
            Entry {
                subject: subject.clone(),
                queue_group: queue_group.clone(),
                sink: tx,
                installed_on_server: connected,
            },
        );
        let op = connected.then(|| ClientOp::Sub {
            subject: subject.clone(),
            queue_group: queue_group.clone(),
            sid,
        });
        (
            Subscription {
                sid,
                subject,
                queue_group,
                rx,
            },
            op,
        )
    }

    /// Remove `sid` from the registry and close its sink. Returns the
    /// `UNSUB` op to send, or `None` if `sid` was never registered (or was
    /// already removed — idempotent, per the "second call returns false"
    /// requirement).
    pub fn unsubscribe(&mut self, sid: Sid) -> Option<ClientOp> {
        self.entries
            .remove(&sid)
            .map(|_| ClientOp::Unsub { sid, max_msgs: None })
    }

    /// Deliver `message` to the sink registered for `sid`, if present.
    /// Messages for unknown sids (e.g. a stale server-side subscription
    /// from before a reconnect raced an `UNSUB`) are silently dropped.
    pub fn deliver(&mut self, sid: Sid, message: Message) {
        if let Some(entry) = self.entries.get(&sid) {
            // A full sink (slow consumer) drops the message rather than
            // blocking the shared reader loop.
            let _ = entry.sink.try_send(message);
        }
    }

    /// Mark every registered subscription as un-installed. Called when the
    /// transport is lost; per the design, delivery does not resume until
    /// `reinstall_all` has re-issued `SUB` for each entry.
    pub fn mark_all_uninstalled(&mut self) {
        for entry in self.entries.values_mut() {
            entry.installed_on_server = false;
        }
    }

    /// Re-issue `SUB` for every registered subscription, in sid order, and
    /// mark each installed. Called once per successful handshake, before
    /// any buffered publish is flushed.
    pub fn reinstall_all(&mut self) -> Vec<ClientOp> {
        let mut sids: Vec<Sid> = self.entries.keys().copied().collect();
        sids.sort_unstable();
        let mut ops = Vec::with_capacity(sids.len());
        for sid in sids {
            let entry = self.entries.get_mut(&sid).expect("sid just collected");
            entry.installed_on_server = true;
            ops.push(ClientOp::Sub {
                subject: entry.subject.clone(),
                queue_group: entry.queue_group.clone(),
                sid,
            });
        }
        ops
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sids_are_unique_and_increasing() {
        let mut reg = Registry::new(8);
        let (s1, _) = reg.subscribe("a".into(), None, false);
        let (s2, _) = reg.subscribe("b".into(), None, false);
        assert_ne!(s1.sid, s2.sid);
        assert!(s2.sid > s1.sid);
    }

    #[test]
    fn subscribe_while_connected_emits_sub_immediately() {
        let mut reg = Registry::new(8);
        let (_sub, op) = reg.subscribe("a".into(), None, true);
        assert!(matches!(op, Some(ClientOp::Sub { .. })));
    }

    #[test]
    fn subscribe_while_disconnected_defers_installation() {
        let mut reg = Registry::new(8);
        let (_sub, op) = reg.subscribe("a".into(), None, false);
        assert!(op.is_none());
    }

    #[test]
    fn unsubscribe_twice_is_safe_and_second_call_fails_softly() {
        let mut reg = Registry::new(8);
        let (sub, _) = reg.subscribe("a".into(), None, false);
        assert!(reg.unsubscribe(sub.sid).is_some());
        assert!(reg.unsubscribe(sub.sid).is_none());
    }

    #[test]
    fn reinstall_all_covers_every_registered_subscription() {
        let mut reg = Registry::new(8);
        reg.subscribe("a".into(), None, false);
        reg.subscribe("b".into(), Some("workers".into()), false);
        let ops = reg.reinstall_all();
        assert_eq!(ops.len(), 2);
        assert!(ops
            .iter()
            .all(|op| matches!(op, ClientOp::Sub { .. })));
    }

    #[tokio::test]
    async fn deliver_reaches_registered_sink_and_drops_for_unknown_sid() {
        let mut reg = Registry::new(8);
        let (mut sub, _) = reg.subscribe("a".into(), None, false);
        reg.deliver(
            sub.sid,
            Message::new("a".into(), sub.sid, None, bytes::Bytes::new(), None, None),
        );
        reg.deliver(
            sub.sid + 999,
            Message::new("a".into(), sub.sid + 999, None, bytes::Bytes::new(), None, None),
        );
        let got = sub.next().await;
        assert!(got.is_some());
    }
}
