//! The connection state machine: connect, handshake, TLS upgrade,
//! reconnect, close. Runs as a single background task (the "cooperative
//! single-threaded event loop" from the design) that owns the transport,
//! the subscription registry, the publish buffer, and the ack queue, and
//! is driven by [`Command`]s sent from [`crate::Client`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pubsub_wire::{ClientOp, ConnectOptions, Header, ServerOp, Sid, Subject};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::ack::AckQueue;
use crate::decode::DecoderRegistry;
use crate::error::{Error, Result};
use crate::keys::KeyPair;
use crate::message::{Message, Responder};
use crate::nuid::Nuid;
use crate::options::ClientOptions;
use crate::publish::{self, PendingPublish, PublishBuffer};
use crate::request::RequestMultiplexer;
use crate::status::{ConnectionStatus, StatusBroadcaster, StatusStream};
use crate::subscription::{Registry, Subscription};
use crate::transport::{ServerAddr, Transport};

pub(crate) enum Command {
    Subscribe {
        subject: Subject,
        queue_group: Option<String>,
        resp: oneshot::Sender<Subscription>,
    },
    Unsubscribe {
        sid: Sid,
        max_msgs: Option<u64>,
        resp: oneshot::Sender<bool>,
    },
    Publish {
        subject: Subject,
        payload: Bytes,
        reply_to: Option<String>,
        header: Option<Header>,
        buffer_if_disconnected: bool,
        resp: Option<oneshot::Sender<Result<bool>>>,
    },
    Request {
        subject: Subject,
        payload: Bytes,
        header: Option<Header>,
        timeout: Duration,
        resp: oneshot::Sender<Result<Message>>,
    },
    Ping {
        resp: oneshot::Sender<Result<()>>,
    },
    SetInboxPrefix {
        prefix: String,
        resp: oneshot::Sender<bool>,
    },
    /// Sent by a request's timeout watcher task so the actor drops the
    /// now-stale leaf waiter instead of leaving it in
    /// `RequestMultiplexer::waiters` until a late reply or `fail_all`.
    CancelRequest {
        leaf: String,
    },
    Close {
        force: bool,
        resp: oneshot::Sender<()>,
    },
}

/// The handle returned to library users. Cloneable; every clone shares
/// the same background connection actor.
#[derive(Clone)]
pub struct Client {
    pub(crate) cmd_tx: mpsc::Sender<Command>,
    pub(crate) status: Arc<StatusBroadcaster>,
    pub(crate) max_payload: Arc<AtomicU64>,
    pub(crate) decoders: Arc<std::sync::RwLock<DecoderRegistry>>,
}

impl Client {
    /// Open a connection to `url` (`nats://`, `tls://`, `ws://`, `wss://`)
    /// and spawn the background connection actor.
    pub async fn connect(url: &str, options: ClientOptions) -> Result<Client> {
        let addr = ServerAddr::parse(url)?;
        let status = Arc::new(StatusBroadcaster::new(ConnectionStatus::Disconnected));
        let max_payload = Arc::new(AtomicU64::new(0));
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let client = Client {
            cmd_tx,
            status: status.clone(),
            max_payload: max_payload.clone(),
            decoders: Arc::new(std::sync::RwLock::new(DecoderRegistry::new())),
        };

        let actor = Actor::new(addr, options, status, max_payload, cmd_rx, client.clone());
        tokio::spawn(actor.run());

        client.wait_until(ConnectionStatus::Connected).await;
        if client.status() != ConnectionStatus::Connected {
            return Err(Error::Disconnected);
        }
        Ok(client)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    pub fn status_stream(&self) -> StatusStream {
        self.status.subscribe()
    }

    pub async fn wait_until(&self, target: ConnectionStatus) {
        let mut stream = self.status.subscribe();
        // Closed is terminal: if we're already there, or the target will
        // never arrive because the actor has shut down, don't hang.
        if stream.current().is_terminal() && stream.current() != target {
            return;
        }
        stream.wait_until(target).await;
    }

    pub fn max_payload(&self) -> u64 {
        self.max_payload.load(Ordering::Relaxed)
    }

    /// Register a decoder for `T`, so that `decode::<T>` can later be
    /// called on a received message's payload.
    pub fn register_decoder<T, F, E>(&self, decode: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&[u8]) -> std::result::Result<T, E> + Send + Sync + 'static,
        E: std::fmt::Display,
    {
        self.decoders.write().expect("decoders lock poisoned").register(decode);
    }

    /// Decode `message`'s payload as `T` using the registered decoder.
    pub fn decode<T: Send + Sync + 'static>(&self, message: &Message) -> Result<T> {
        self.decoders
            .read()
            .expect("decoders lock poisoned")
            .decode(&message.payload)
    }

    pub async fn subscribe(&self, subject: impl Into<Subject>) -> Result<Subscription> {
        self.subscribe_with_queue(subject, None).await
    }

    pub async fn subscribe_with_queue(
        &self,
        subject: impl Into<Subject>,
        queue_group: Option<String>,
    ) -> Result<Subscription> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe {
                subject: subject.into(),
                queue_group,
                resp,
            })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn unsubscribe(&self, sid: Sid) -> Result<bool> {
        self.unsubscribe_after(sid, None).await
    }

    pub async fn unsubscribe_after(&self, sid: Sid, max_msgs: Option<u64>) -> Result<bool> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Unsubscribe { sid, max_msgs, resp })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn publish(&self, subject: impl Into<Subject>, payload: impl Into<Bytes>) -> Result<bool> {
        self.publish_full(subject, payload, None, None, true).await
    }

    pub async fn publish_full(
        &self,
        subject: impl Into<Subject>,
        payload: impl Into<Bytes>,
        reply_to: Option<String>,
        header: Option<Header>,
        buffer_if_disconnected: bool,
    ) -> Result<bool> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Publish {
                subject: subject.into(),
                payload: payload.into(),
                reply_to,
                header,
                buffer_if_disconnected,
                resp: Some(resp),
            })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub async fn request(
        &self,
        subject: impl Into<Subject>,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Message> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request {
                subject: subject.into(),
                payload: payload.into(),
                header: None,
                timeout,
                resp,
            })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub async fn ping(&self) -> Result<()> {
        let (resp, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Ping { resp })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    pub async fn set_inbox_prefix(&self, prefix: impl Into<String>) -> bool {
        let (resp, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::SetInboxPrefix {
                prefix: prefix.into(),
                resp,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn close(&self) {
        self.close_inner(false).await;
    }

    pub async fn force_close(&self) {
        self.close_inner(true).await;
    }

    async fn close_inner(&self, force: bool) {
        let (resp, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close { force, resp }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

impl Responder for Client {
    fn respond(&self, subject: &str, payload: Bytes, header: Option<Header>) -> Result<()> {
        self.cmd_tx
            .try_send(Command::Publish {
                subject: subject.to_owned(),
                payload,
                reply_to: None,
                header,
                buffer_if_disconnected: true,
                resp: None,
            })
            .map_err(|_| Error::Closed)
    }
}

/// Owns everything the background task needs. Never cloned; lives only
/// inside the spawned `run` future.
struct Actor {
    addr: ServerAddr,
    options: ClientOptions,
    status: Arc<StatusBroadcaster>,
    max_payload: Arc<AtomicU64>,
    cmd_rx: mpsc::Receiver<Command>,

    registry: Registry,
    publish_buffer: PublishBuffer,
    ack_queue: AckQueue,
    request_mux: RequestMultiplexer,
    nuid: Nuid,
    key_pair: Option<KeyPair>,
    retries_left: i64,
    closed: bool,
    responder: Arc<dyn Responder>,
    /// A sender back into our own command queue, so spawned helper tasks
    /// (e.g. a request's timeout watcher) can ask the actor to do
    /// something without ever touching `&mut self` themselves.
    self_tx: mpsc::Sender<Command>,
}

impl Actor {
    fn new(
        addr: ServerAddr,
        options: ClientOptions,
        status: Arc<StatusBroadcaster>,
        max_payload: Arc<AtomicU64>,
        cmd_rx: mpsc::Receiver<Command>,
        responder: Client,
    ) -> Self {
        let key_pair = options
            .nkey_seed
            .as_deref()
            .and_then(|seed| KeyPair::from_seed(seed).ok());
        let mut request_mux = RequestMultiplexer::new();
        if let Some(prefix) = &options.inbox_prefix {
            request_mux.set_inbox_prefix(prefix.clone());
        }
        let retries_left = options.retry_count;
        let self_tx = responder.cmd_tx.clone();
        Actor {
            addr,
            options,
            status,
            max_payload,
            cmd_rx,
            registry: Registry::new(256),
            publish_buffer: PublishBuffer::new(),
            ack_queue: AckQueue::new(),
            request_mux,
            nuid: Nuid::new(),
            key_pair,
            retries_left,
            closed: false,
            responder: Arc::new(responder) as Arc<dyn Responder>,
            self_tx,
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.set(status);
    }

    async fn run(mut self) {
        self.set_status(ConnectionStatus::Connecting);
        let mut transport = match self.connect_loop(true).await {
            Some(t) => t,
            None => {
                self.set_status(ConnectionStatus::Closed);
                self.drain_commands_as_closed().await;
                return;
            }
        };

        let mut ping_interval = interval(self.options.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut outstanding_pings: u32 = 0;
        let mut pending_ping_probe: Option<oneshot::Sender<Result<()>>> = None;

        loop {
            if self.closed {
                break;
            }
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None => { self.closed = true; }
                        Some(cmd) => {
                            self.handle_command(cmd, &mut transport, &mut pending_ping_probe).await;
                        }
                    }
                }

                op = transport.recv() => {
                    match op {
                        Ok(Some(op)) => {
                            self.handle_server_op(op, &mut transport, &mut outstanding_pings, &mut pending_ping_probe).await;
                        }
                        Ok(None) | Err(_) => {
                            warn!("transport lost");
                            self.registry.mark_all_uninstalled();
                            self.ack_queue.fail_all();
                            self.request_mux.fail_all();
                            if let Some(probe) = pending_ping_probe.take() {
                                let _ = probe.send(Err(Error::Disconnected));
                            }
                            self.set_status(ConnectionStatus::Disconnected);
                            match self.connect_loop(false).await {
                                Some(t) => {
                                    transport = t;
                                    outstanding_pings = 0;
                                }
                                None => {
                                    self.set_status(ConnectionStatus::Closed);
                                    break;
                                }
                            }
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if self.status.current() == ConnectionStatus::Connected {
                        if outstanding_pings >= self.options.max_outstanding_pings {
                            warn!("stale connection: too many unanswered pings");
                            self.registry.mark_all_uninstalled();
                            self.ack_queue.fail_all();
                            self.request_mux.fail_all();
                            if let Some(probe) = pending_ping_probe.take() {
                                let _ = probe.send(Err(Error::Disconnected));
                            }
                            self.set_status(ConnectionStatus::Disconnected);
                            match self.connect_loop(false).await {
                                Some(t) => { transport = t; outstanding_pings = 0; }
                                None => { self.set_status(ConnectionStatus::Closed); break; }
                            }
                        } else if transport.send(ClientOp::Ping).await.is_ok() {
                            outstanding_pings += 1;
                        }
                    }
                }
            }
        }

        self.set_status(ConnectionStatus::Closed);
        self.drain_commands_as_closed().await;
    }

    async fn drain_commands_as_closed(&mut self) {
        self.request_mux = RequestMultiplexer::new();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            fail_command(cmd);
        }
    }

    /// Open the transport, perform the handshake, and bring subscriptions
    /// and the publish buffer back online. Returns `None` if retries are
    /// exhausted or a fatal error occurred (the caller should close).
    async fn connect_loop(&mut self, first_attempt: bool) -> Option<Transport> {
        loop {
            self.set_status(if first_attempt {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            });

            match timeout(self.options.connect_timeout, self.connect_once()).await {
                Ok(Ok(transport)) => return Some(transport),
                Ok(Err(Error::TlsRequiredByClient)) | Ok(Err(Error::TlsHandshake(_))) => {
                    error!("fatal TLS error, closing");
                    return None;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "connect attempt failed");
                }
                Err(_) => {
                    warn!("connect attempt timed out");
                }
            }

            if self.retries_left == 0 {
                return None;
            }
            if self.retries_left > 0 {
                self.retries_left -= 1;
            }
            tokio::time::sleep(self.options.retry_interval).await;
        }
    }

    async fn connect_once(&mut self) -> Result<Transport> {
        let mut transport = if self.addr.scheme.is_websocket() {
            let tls_config = if self.addr.scheme.is_tls() {
                Some(self.options.tls_config_or_default())
            } else {
                None
            };
            Transport::connect_websocket(&self.addr, tls_config).await?
        } else {
            Transport::connect_tcp(&self.addr).await?
        };

        self.set_status(ConnectionStatus::InfoHandshake);

        let info = loop {
            match transport.recv().await? {
                Some(ServerOp::Info(info)) => break *info,
                Some(_) => continue,
                None => return Err(Error::Disconnected),
            }
        };
        self.max_payload.store(info.max_payload, Ordering::Relaxed);

        if self.options.tls_required && !info.tls_required && !self.addr.scheme.is_tls() {
            return Err(Error::TlsRequiredByClient);
        }
        if info.tls_required && !self.addr.scheme.is_tls() {
            self.set_status(ConnectionStatus::TlsHandshake);
            let tls_config = self.options.tls_config_or_default();
            transport = transport.upgrade_tls(&self.addr.host, tls_config).await?;
        }

        let sig = match (&self.key_pair, &info.nonce) {
            (Some(kp), Some(nonce)) => Some(kp.sign(nonce.as_bytes())),
            _ => None,
        };
        let connect_opts = ConnectOptions {
            verbose: self.options.verbose,
            pedantic: self.options.pedantic,
            tls_required: self.options.tls_required,
            user: self.options.user.clone(),
            pass: self.options.pass.clone(),
            auth_token: self.options.auth_token.clone(),
            jwt: self.options.jwt.clone(),
            nkey: self.key_pair.as_ref().map(|kp| kp.public_key()),
            sig,
            name: self.options.name.clone(),
            lang: "rust".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            protocol: 1,
            echo: self.options.echo,
            headers: self.options.headers,
            no_responders: self.options.no_responders,
        };

        transport.send(ClientOp::Connect(Box::new(connect_opts))).await?;

        if self.options.verbose {
            // This handshake runs before the actor's select loop exists,
            // so there's no one else to read the `+OK`/`-ERR` off the
            // wire for us — read it directly rather than routing it
            // through `ack_queue`, which only the main loop ever drains.
            loop {
                match transport.recv().await? {
                    Some(ServerOp::Ok) => break,
                    Some(ServerOp::Err(reason)) => {
                        self.set_status(ConnectionStatus::Disconnected);
                        return Err(Error::AuthenticationFailed(reason));
                    }
                    Some(ServerOp::Ping) => {
                        transport.send(ClientOp::Pong).await?;
                    }
                    Some(_) => continue,
                    None => return Err(Error::Disconnected),
                }
            }
        }

        self.set_status(ConnectionStatus::Connected);
        info!(host = %self.addr.host, port = self.addr.port, "handshake complete");

        for op in self.registry.reinstall_all() {
            transport.send(op).await?;
        }
        for pending in self.publish_buffer.drain_all() {
            transport.send(pending.into_op()).await?;
        }

        Ok(transport)
    }

    async fn handle_command(
        &mut self,
        cmd: Command,
        transport: &mut Transport,
        pending_ping_probe: &mut Option<oneshot::Sender<Result<()>>>,
    ) {
        match cmd {
            Command::Subscribe {
                subject,
                queue_group,
                resp,
            } => {
                let connected = self.status.current() == ConnectionStatus::Connected;
                let (sub, op) = self.registry.subscribe(subject, queue_group, connected);
                if let Some(op) = op {
                    let _ = transport.send(op).await;
                }
                let _ = resp.send(sub);
            }
            Command::Unsubscribe { sid, max_msgs, resp } => {
                let op = if max_msgs.is_some() {
                    // Drain semantics: let the server finish delivering up
                    // to `max_msgs`, still tear down our side immediately
                    // per the registry's unsubscribe contract.
                    self.registry
                        .unsubscribe(sid)
                        .map(|_| ClientOp::Unsub { sid, max_msgs })
                } else {
                    self.registry.unsubscribe(sid)
                };
                let ok = op.is_some();
                if let Some(op) = op {
                    let _ = transport.send(op).await;
                }
                let _ = resp.send(ok);
            }
            Command::Publish {
                subject,
                payload,
                reply_to,
                header,
                buffer_if_disconnected,
                resp,
            } => {
                self.do_publish(subject, payload, reply_to, header, buffer_if_disconnected, transport, resp)
                    .await;
            }
            Command::Request {
                subject,
                payload,
                header,
                timeout: req_timeout,
                resp,
            } => {
                self.handle_request(subject, payload, header, req_timeout, resp, transport)
                    .await;
            }
            Command::Ping { resp } => {
                if transport.send(ClientOp::Ping).await.is_err() {
                    let _ = resp.send(Err(Error::Disconnected));
                } else {
                    *pending_ping_probe = Some(resp);
                }
            }
            Command::SetInboxPrefix { prefix, resp } => {
                let _ = resp.send(self.request_mux.set_inbox_prefix(prefix));
            }
            Command::CancelRequest { leaf } => {
                self.request_mux.cancel(&leaf);
            }
            Command::Close { force, resp } => {
                if force {
                    self.retries_left = 0;
                }
                self.closed = true;
                let _ = resp.send(());
            }
        }
    }

    /// Send (or buffer) a publish. Crucially, this never blocks the
    /// actor's select loop on the verbose-mode ack: that ack only arrives
    /// as a `+OK`/`-ERR` read by the `transport.recv()` arm in `run`, so
    /// awaiting it here inline would starve the very loop that delivers
    /// it. Instead the ack wait (if anyone is listening for it at all) is
    /// handed to its own spawned task.
    #[allow(clippy::too_many_arguments)]
    async fn do_publish(
        &mut self,
        subject: Subject,
        payload: Bytes,
        reply_to: Option<String>,
        header: Option<Header>,
        buffer_if_disconnected: bool,
        transport: &mut Transport,
        resp: Option<oneshot::Sender<Result<bool>>>,
    ) {
        if self.status.current() != ConnectionStatus::Connected {
            if buffer_if_disconnected {
                self.publish_buffer.push(PendingPublish {
                    subject,
                    payload,
                    reply_to,
                    header,
                });
                if let Some(resp) = resp {
                    let _ = resp.send(Ok(true));
                }
            } else if let Some(resp) = resp {
                let _ = resp.send(Ok(false));
            }
            return;
        }

        let op = publish::to_op(subject, payload, reply_to, header);

        if self.options.verbose {
            // Register before sending so the FIFO slot is reserved in the
            // same order the op goes out, whether or not anyone ends up
            // awaiting this particular ack.
            let ack_rx = self.ack_queue.register();
            if let Err(e) = transport.send(op).await {
                if let Some(resp) = resp {
                    let _ = resp.send(Err(e));
                }
                return;
            }
            if let Some(resp) = resp {
                tokio::spawn(async move {
                    let ok = ack_rx.await.unwrap_or(false);
                    let _ = resp.send(Ok(ok));
                });
            }
        } else {
            match transport.send(op).await {
                Ok(()) => {
                    if let Some(resp) = resp {
                        let _ = resp.send(Ok(true));
                    }
                }
                Err(e) => {
                    if let Some(resp) = resp {
                        let _ = resp.send(Err(e));
                    }
                }
            }
        }
    }

    async fn handle_request(
        &mut self,
        subject: Subject,
        payload: Bytes,
        header: Option<Header>,
        req_timeout: Duration,
        resp: oneshot::Sender<Result<Message>>,
        transport: &mut Transport,
    ) {
        if !self.request_mux.has_inbox() {
            let wildcard = self.request_mux.ensure_inbox(&mut self.nuid).to_owned() + ".>";
            let connected = self.status.current() == ConnectionStatus::Connected;
            let (_sub, op) = self.registry.subscribe(wildcard, None, connected);
            // The inbox subscription's messages are routed by the reader
            // loop directly into `request_mux`, never through the normal
            // per-sid sink, so we intentionally let `_sub` drop here —
            // see `handle_server_op`'s Msg/HMsg arms.
            if let Some(op) = op {
                let _ = transport.send(op).await;
            }
        }
        let (leaf, rx) = self.request_mux.new_request(&mut self.nuid);
        let op = publish::to_op(subject, payload, Some(leaf.clone()), header);
        if let Err(e) = transport.send(op).await {
            self.request_mux.cancel(&leaf);
            let _ = resp.send(Err(e));
            return;
        }
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = match timeout(req_timeout, rx).await {
                Ok(Ok(message)) => Ok(message),
                Ok(Err(_)) => Err(Error::Disconnected),
                Err(_) => {
                    // Nobody answered in time; drop the now-stale waiter
                    // rather than leaving it in the multiplexer until a
                    // late reply happens to land on it or `fail_all` runs.
                    let _ = self_tx.send(Command::CancelRequest { leaf }).await;
                    Err(Error::RequestTimeout(req_timeout))
                }
            };
            let _ = resp.send(result);
        });
    }

    async fn handle_server_op(
        &mut self,
        op: ServerOp,
        transport: &mut Transport,
        outstanding_pings: &mut u32,
        pending_ping_probe: &mut Option<oneshot::Sender<Result<()>>>,
    ) {
        match op {
            ServerOp::Info(_) => {
                debug!("received unsolicited INFO, ignoring");
            }
            ServerOp::Ping => {
                let _ = transport.send(ClientOp::Pong).await;
            }
            ServerOp::Pong => {
                *outstanding_pings = outstanding_pings.saturating_sub(1);
                if let Some(probe) = pending_ping_probe.take() {
                    let _ = probe.send(Ok(()));
                }
            }
            ServerOp::Ok => {
                self.ack_queue.complete_next(true);
            }
            ServerOp::Err(reason) => {
                warn!(%reason, "server returned -ERR");
                self.ack_queue.complete_next(false);
            }
            ServerOp::Msg {
                subject,
                sid,
                reply_to,
                payload,
            } => self.deliver(subject, sid, reply_to, payload, None),
            ServerOp::HMsg {
                subject,
                sid,
                reply_to,
                header,
                payload,
            } => self.deliver(subject, sid, reply_to, payload, Some(header)),
        }
    }

    fn deliver(
        &mut self,
        subject: Subject,
        sid: Sid,
        reply_to: Option<String>,
        payload: Bytes,
        header: Option<Header>,
    ) {
        if let Some(wildcard) = self.request_mux.inbox_wildcard() {
            if subject_matches_wildcard(&subject, &wildcard) {
                let message = Message::new(
                    subject.clone(),
                    sid,
                    reply_to,
                    payload,
                    header,
                    Some(self.responder.clone()),
                );
                self.request_mux.route(&subject, message);
                return;
            }
        }
        let message = Message::new(
            subject,
            sid,
            reply_to,
            payload,
            header,
            Some(self.responder.clone()),
        );
        self.registry.deliver(sid, message);
    }
}

fn subject_matches_wildcard(subject: &str, wildcard: &str) -> bool {
    // `wildcard` is always `<root>.>`; a tail wildcard matches the root
    // plus anything below it.
    wildcard
        .strip_suffix(".>")
        .map(|root| subject.starts_with(root) && subject.len() > root.len())
        .unwrap_or(false)
}

fn fail_command(cmd: Command) {
    match cmd {
        Command::Subscribe { .. } | Command::Unsubscribe { .. } => {}
        Command::Publish { resp: Some(resp), .. } => {
            let _ = resp.send(Err(Error::Closed));
        }
        Command::Publish { resp: None, .. } => {}
        Command::Request { resp, .. } => {
            let _ = resp.send(Err(Error::Closed));
        }
        Command::Ping { resp } => {
            let _ = resp.send(Err(Error::Closed));
        }
        Command::SetInboxPrefix { resp, .. } => {
            let _ = resp.send(false);
        }
        Command::CancelRequest { .. } => {}
        Command::Close { resp, .. } => {
            let _ = resp.send(());
        }
    }
}
