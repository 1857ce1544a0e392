use bytes::Bytes;
use pubsub_wire::{Header, Sid, Subject};
use std::sync::Arc;

use crate::error::Result;

/// Anything capable of publishing a reply on behalf of a received
/// [`Message`]. Implemented by the client facade; kept as a trait so this
/// module has no dependency on the connection machinery.
pub trait Responder: Send + Sync {
    fn respond(&self, subject: &str, payload: Bytes, header: Option<Header>) -> Result<()>;
}

/// A message delivered to a subscription, or received as a request reply.
/// Immutable once produced by the decoder. Carries an optional handle back
/// to the client so `respond` can be called inline without the caller
/// needing to track the originating subject.
#[derive(Clone)]
pub struct Message {
    pub subject: Subject,
    pub sid: Sid,
    pub reply_to: Option<String>,
    pub payload: Bytes,
    pub header: Option<Header>,
    responder: Option<Arc<dyn Responder>>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("sid", &self.sid)
            .field("reply_to", &self.reply_to)
            .field("payload_len", &self.payload.len())
            .field("header", &self.header)
            .finish()
    }
}

impl Message {
    pub fn new(
        subject: Subject,
        sid: Sid,
        reply_to: Option<String>,
        payload: Bytes,
        header: Option<Header>,
        responder: Option<Arc<dyn Responder>>,
    ) -> Self {
        Message {
            subject,
            sid,
            reply_to,
            payload,
            header,
            responder,
        }
    }

    /// Publish `payload` to this message's `reply_to`, if any and if this
    /// message was produced by a client that can respond.
    pub fn respond(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.respond_with_header(payload, None)
    }

    pub fn respond_with_header(
        &self,
        payload: impl Into<Bytes>,
        header: Option<Header>,
    ) -> Result<()> {
        let Some(reply_to) = &self.reply_to else {
            return Ok(());
        };
        let Some(responder) = &self.responder else {
            return Ok(());
        };
        responder.respond(reply_to, payload.into(), header)
    }
}
