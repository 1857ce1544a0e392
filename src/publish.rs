use std::collections::VecDeque;

use bytes::Bytes;
use pubsub_wire::{ClientOp, Header, Subject};

/// `(subject, payload, reply_to?, header?)` held in the pre-connect
/// buffer; flushed in FIFO order once the handshake completes, after
/// subscriptions have been re-installed.
#[derive(Debug, Clone)]
pub struct PendingPublish {
    pub subject: Subject,
    pub payload: Bytes,
    pub reply_to: Option<String>,
    pub header: Option<Header>,
}

impl PendingPublish {
    pub fn into_op(self) -> ClientOp {
        to_op(self.subject, self.payload, self.reply_to, self.header)
    }
}

/// Turn publish arguments into the wire op that carries them: `PUB` if
/// there's no header, `HPUB` otherwise.
pub fn to_op(
    subject: Subject,
    payload: Bytes,
    reply_to: Option<String>,
    header: Option<Header>,
) -> ClientOp {
    match header {
        None => ClientOp::Pub {
            subject,
            reply_to,
            payload,
        },
        Some(header) => ClientOp::HPub {
            subject,
            reply_to,
            header,
            payload,
        },
    }
}

/// Holds publishes issued while not connected. The design leaves this
/// unbounded by default (closing the client is the only thing that drops
/// it); a caller that wants a bound can check `len()` itself before
/// calling `publish` with `buffer_if_disconnected: true`.
#[derive(Default)]
pub struct PublishBuffer {
    pending: VecDeque<PendingPublish>,
}

impl PublishBuffer {
    pub fn new() -> Self {
        PublishBuffer::default()
    }

    pub fn push(&mut self, publish: PendingPublish) {
        self.pending.push_back(publish);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain everything, in FIFO order, for flushing post-handshake.
    pub fn drain_all(&mut self) -> Vec<PendingPublish> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_produces_pub() {
        let op = to_op("s".into(), Bytes::from_static(b"x"), None, None);
        assert!(matches!(op, ClientOp::Pub { .. }));
    }

    #[test]
    fn with_header_produces_hpub() {
        let op = to_op("s".into(), Bytes::from_static(b"x"), None, Some(Header::new()));
        assert!(matches!(op, ClientOp::HPub { .. }));
    }

    #[test]
    fn buffer_drains_in_fifo_order() {
        let mut buf = PublishBuffer::new();
        buf.push(PendingPublish {
            subject: "a".into(),
            payload: Bytes::new(),
            reply_to: None,
            header: None,
        });
        buf.push(PendingPublish {
            subject: "b".into(),
            payload: Bytes::new(),
            reply_to: None,
            header: None,
        });
        let drained = buf.drain_all();
        assert_eq!(drained[0].subject, "a");
        assert_eq!(drained[1].subject, "b");
        assert!(buf.is_empty());
    }
}
