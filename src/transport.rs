//! Transport byte-stream abstraction: TCP, TCP+TLS, and WebSocket frames
//! unified behind one `send`/`recv` capability so the connection state
//! machine never branches on scheme after the initial connect.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use pubsub_wire::{ClientOp, ServerOp, WireCodec, WireError};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::codec::{Decoder, Encoder, Framed};
use url::Url;

use crate::error::{Error, Result};

/// The URL scheme dictates the transport and its default port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Nats,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    pub fn parse(s: &str) -> Option<Scheme> {
        match s {
            "nats" => Some(Scheme::Nats),
            "tls" => Some(Scheme::Tls),
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Nats => 4222,
            Scheme::Tls => 4443,
            // WebSocket default ports are transport-provided (80/443); we
            // lean on `url`'s own default-port handling for those.
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }

    pub fn is_tls(self) -> bool {
        matches!(self, Scheme::Tls | Scheme::Wss)
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Scheme::Ws | Scheme::Wss)
    }
}

pub struct ServerAddr {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub url: Url,
}

impl ServerAddr {
    pub fn parse(raw: &str) -> Result<ServerAddr> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidUrl(raw.to_owned(), e.to_string()))?;
        let scheme = Scheme::parse(url.scheme())
            .ok_or_else(|| Error::UnsupportedScheme(url.scheme().to_owned()))?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(raw.to_owned(), "missing host".to_owned()))?
            .to_owned();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(ServerAddr {
            scheme,
            host,
            port,
            url,
        })
    }
}

/// Raw byte-stream IO: either a bare TCP socket or one upgraded in-place
/// to TLS. Only this variant supports the `upgrade_tls` step — a
/// WebSocket transport is always already secure-or-not at connect time.
enum RawIo {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for RawIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RawIo::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            RawIo::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RawIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            RawIo::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            RawIo::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RawIo::Tcp(s) => Pin::new(s).poll_flush(cx),
            RawIo::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            RawIo::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            RawIo::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// The unified transport: a framed raw byte stream, or a WebSocket stream
/// with the wire codec driven manually against an accumulator buffer
/// (`WebSocketStream` is message-framed, not byte-framed, so it can't sit
/// behind `Framed` directly).
pub enum Transport {
    Raw(Framed<RawIo, WireCodec>),
    Ws {
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        codec: WireCodec,
        buf: BytesMut,
    },
}

impl Transport {
    pub async fn connect_tcp(addr: &ServerAddr) -> Result<Transport> {
        let stream = TcpStream::connect((addr.host.as_str(), addr.port)).await?;
        stream.set_nodelay(true).ok();
        let framed = Framed::new(RawIo::Tcp(stream), WireCodec::new());
        Ok(Transport::Raw(framed))
    }

    pub async fn connect_websocket(addr: &ServerAddr, tls_config: Option<Arc<ClientConfig>>) -> Result<Transport> {
        let connector = tls_config.map(Connector::Rustls);
        let (ws, _response) =
            tokio_tungstenite::connect_async_tls_with_config(addr.url.as_str(), None, false, connector)
                .await?;
        Ok(Transport::Ws {
            ws,
            codec: WireCodec::new(),
            buf: BytesMut::new(),
        })
    }

    /// Upgrade a `Raw` transport carrying a plain TCP socket to TLS,
    /// in-place. Any already-buffered-but-undecoded bytes are preserved.
    /// Only valid to call once, right after the `INFO` handshake line and
    /// before any further reads.
    pub async fn upgrade_tls(self, host: &str, tls_config: Arc<ClientConfig>) -> Result<Transport> {
        let Transport::Raw(framed) = self else {
            return Err(Error::TlsHandshake(
                "TLS upgrade only applies to a raw TCP transport".to_owned(),
            ));
        };
        let parts = framed.into_parts();
        let RawIo::Tcp(tcp) = parts.io else {
            return Err(Error::TlsHandshake("transport is already TLS".to_owned()));
        };
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;
        let connector = TlsConnector::from(tls_config);
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::TlsHandshake(e.to_string()))?;
        let mut new_parts = Framed::new(RawIo::Tls(Box::new(tls_stream)), WireCodec::new()).into_parts();
        new_parts.read_buf = parts.read_buf;
        new_parts.write_buf = parts.write_buf;
        Ok(Transport::Raw(Framed::from_parts(new_parts)))
    }

    pub async fn send(&mut self, op: ClientOp) -> Result<()> {
        match self {
            Transport::Raw(framed) => framed.send(op).await.map_err(map_wire_err),
            Transport::Ws { ws, codec, .. } => {
                let mut buf = BytesMut::new();
                codec.encode(op, &mut buf).map_err(map_wire_err)?;
                ws.send(WsMessage::Binary(buf.freeze().to_vec().into()))
                    .await?;
                Ok(())
            }
        }
    }

    /// Receive the next decoded server op, or `None` on a clean transport
    /// close.
    pub async fn recv(&mut self) -> Result<Option<ServerOp>> {
        match self {
            Transport::Raw(framed) => framed.next().await.transpose().map_err(map_wire_err),
            Transport::Ws { ws, codec, buf } => loop {
                if let Some(op) = codec.decode(buf).map_err(map_wire_err)? {
                    return Ok(Some(op));
                }
                match ws.next().await {
                    None => return Ok(None),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(WsMessage::Binary(b))) => buf.extend_from_slice(&b),
                    Some(Ok(WsMessage::Text(t))) => buf.extend_from_slice(t.as_bytes()),
                    Some(Ok(WsMessage::Ping(payload))) => {
                        ws.send(WsMessage::Pong(payload)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) => return Ok(None),
                    Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                }
            },
        }
    }
}

fn map_wire_err(e: WireError) -> Error {
    match e {
        WireError::Io(io) => Error::Io(io),
        other => Error::Wire(other),
    }
}
