//! Wire-level types and codec for the line-oriented pub/sub protocol.
//!
//! This crate owns the protocol codec: the `Info`/`ConnectOptions`/`Header`
//! value types, and the `tokio_util::codec::{Decoder, Encoder}`
//! implementation that frames the `INFO`/`MSG`/`HMSG`/`PING`/`PONG`/`+OK`/
//! `-ERR` server ops and the `CONNECT`/`PUB`/`HPUB`/`SUB`/`UNSUB`/`PING`/
//! `PONG` client ops. The richer `Message` type (with its back-reference
//! for in-line replies) lives in the client crate, one layer up, to avoid
//! a dependency cycle.
//!
//! Subjects are opaque dot-separated strings (`foo.bar.*`, `foo.>`); this
//! crate never validates them, matching the server-delegated validation
//! called out in the data model.

mod codec;
mod header;
mod message;

pub use codec::{ClientOp, ServerOp, WireCodec, WireError};
pub use header::Header;
pub use message::{ConnectOptions, Info};

/// A subscription id: client-assigned, monotonically increasing, unique
/// for the lifetime of a client.
pub type Sid = u64;

/// Subjects are opaque dot-separated token strings; validation is
/// delegated to the server.
pub type Subject = String;
