//! Client library for a line-oriented publish/subscribe messaging
//! protocol: connection management (including TLS upgrade and transparent
//! reconnect), a subscription registry, a publish pipeline with a
//! pre-connect buffer, a request/reply multiplexer, and the identity
//! primitives (NUID, seed/key codec, Ed25519 signatures) needed for
//! authenticated handshakes.
//!
//! The core building block is [`Client`]; open one with [`Client::connect`].

mod ack;
mod connection;
mod decode;
mod error;
mod keys;
mod message;
mod nuid;
mod options;
mod publish;
mod request;
mod status;
mod subscription;
mod transport;

pub use connection::Client;
pub use error::{Error, Result};
pub use keys::{IdentityError, KeyPair, Prefix};
pub use message::{Message, Responder};
pub use nuid::Nuid;
pub use options::ClientOptions;
pub use status::{ConnectionStatus, StatusStream};
pub use subscription::Subscription;

pub use pubsub_wire::{Header, Info, Sid, Subject};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_surface_compiles_and_links() {
        // Smoke test that the facade's primary types are constructible
        // without a live server, exercising the wiring between modules
        // rather than protocol behavior (covered in crates/wire and the
        // root tests/ integration suite).
        let _opts = ClientOptions::new()
            .verbose(true)
            .retry_count(3)
            .name("smoke-test");
        let _nuid = Nuid::new();
    }
}
