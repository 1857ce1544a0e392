use std::time::Duration;

/// Errors surfaced to a single caller. Errors that drive the reconnect
/// loop (transport loss, handshake protocol errors) are not represented
/// here — the design folds those into [`crate::status::ConnectionStatus`]
/// transitions instead, per the propagation policy in the design notes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire protocol error: {0}")]
    Wire(#[from] pubsub_wire::WireError),

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("unsupported URL scheme '{0}', expected one of nats/tls/ws/wss")]
    UnsupportedScheme(String),

    #[error("invalid server URL '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("TLS is required by the client but the server does not support it")]
    TlsRequiredByClient,

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("server rejected CONNECT: {0}")]
    AuthenticationFailed(String),

    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("connection closed")]
    Disconnected,

    #[error("client is closed")]
    Closed,

    #[error("identity error: {0}")]
    Identity(#[from] crate::keys::IdentityError),

    #[error("no decoder registered for this payload type")]
    NoDecoder,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("inbox prefix can only be changed before first use")]
    InboxPrefixAlreadyInUse,
}

pub type Result<T> = std::result::Result<T, Error>;
