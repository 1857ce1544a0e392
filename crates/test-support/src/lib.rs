//! An in-process mock server speaking just enough of the wire protocol to
//! drive the client's integration tests: it answers the handshake, tracks
//! subscriptions (with `*`/`>` wildcard matching), and routes published
//! messages to matching subscribers across every connected client.
//!
//! This deliberately doesn't reuse `pubsub_wire::WireCodec` — that codec
//! decodes server ops and encodes client ops (the client's side of the
//! wire); here we need the other direction. The framing rules are the
//! same ones `pubsub-wire` implements, just applied in reverse, and kept
//! intentionally minimal: no header support, and every `CONNECT`/`PUB`
//! gets an unconditional `+OK` (never `-ERR`) rather than tracking each
//! connection's actual verbose flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub subject: String,
    pub sid: u64,
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

/// Everything the writer task can put on the wire: a delivered message, or
/// a bare `+OK` ack line for verbose-mode `CONNECT`/`PUB` acknowledgement.
/// Kept as one channel so a single task owns the write half.
enum OutFrame {
    Msg(MockMessage),
    Ack,
}

struct Subscriber {
    conn_id: u64,
    sid: u64,
    subject_tokens: Vec<String>,
    tx: mpsc::UnboundedSender<OutFrame>,
}

#[derive(Default)]
struct Broker {
    subscribers: Vec<Subscriber>,
}

impl Broker {
    fn subscribe(
        &mut self,
        conn_id: u64,
        sid: u64,
        subject: &str,
        tx: mpsc::UnboundedSender<OutFrame>,
    ) {
        self.subscribers.push(Subscriber {
            conn_id,
            sid,
            subject_tokens: subject.split('.').map(str::to_owned).collect(),
            tx,
        });
    }

    fn unsubscribe(&mut self, conn_id: u64, sid: u64) {
        self.subscribers
            .retain(|s| !(s.conn_id == conn_id && s.sid == sid));
    }

    fn drop_connection(&mut self, conn_id: u64) {
        self.subscribers.retain(|s| s.conn_id != conn_id);
    }

    fn publish(&self, subject: &str, reply_to: Option<String>, payload: &[u8]) {
        let tokens: Vec<&str> = subject.split('.').collect();
        for sub in &self.subscribers {
            if subject_matches(&sub.subject_tokens, &tokens) {
                let _ = sub.tx.send(OutFrame::Msg(MockMessage {
                    subject: subject.to_owned(),
                    sid: sub.sid,
                    reply_to: reply_to.clone(),
                    payload: payload.to_vec(),
                }));
            }
        }
    }
}

fn subject_matches(pattern: &[String], subject: &[&str]) -> bool {
    for (i, tok) in pattern.iter().enumerate() {
        if tok == ">" {
            return true;
        }
        match subject.get(i) {
            Some(_) if tok == "*" => continue,
            Some(s) if s == tok => continue,
            _ => return false,
        }
    }
    pattern.len() == subject.len()
}

type KillSwitches = Arc<Mutex<HashMap<u64, oneshot::Sender<()>>>>;

pub struct MockServer {
    addr: std::net::SocketAddr,
    kill_switches: KillSwitches,
    accept_handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let broker = Arc::new(Mutex::new(Broker::default()));
        let next_conn_id = Arc::new(AtomicU64::new(1));
        let kill_switches: KillSwitches = Arc::new(Mutex::new(HashMap::new()));

        let accept_switches = kill_switches.clone();
        let accept_handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "mock server accept failed");
                        return;
                    }
                };
                let broker = broker.clone();
                let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
                let (kill_tx, kill_rx) = oneshot::channel();
                accept_switches.lock().await.insert(conn_id, kill_tx);
                let switches = accept_switches.clone();
                tokio::spawn(async move {
                    handle_connection(stream, broker, conn_id, kill_rx).await;
                    switches.lock().await.remove(&conn_id);
                });
            }
        });

        MockServer { addr, kill_switches, accept_handle }
    }

    pub fn url(&self) -> String {
        format!("nats://{}", self.addr)
    }

    pub fn addr(&self) -> std::net::SocketAddr {
        self.addr
    }

    /// Forcibly closes every currently-open client connection, without
    /// stopping the listener — simulates a transport drop that the
    /// client should reconnect from.
    pub async fn disconnect_all(&self) {
        let mut switches = self.kill_switches.lock().await;
        for (_, kill_tx) in switches.drain() {
            let _ = kill_tx.send(());
        }
    }

    /// Stops accepting new connections and drops every existing one,
    /// simulating a server that has permanently gone away.
    pub async fn shutdown(self) {
        self.accept_handle.abort();
        self.disconnect_all().await;
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    broker: Arc<Mutex<Broker>>,
    conn_id: u64,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let info = format!(
        "INFO {{\"server_id\":\"mock-{conn_id}\",\"server_name\":\"mock\",\"version\":\"0.0.0\",\"host\":\"127.0.0.1\",\"port\":0,\"max_payload\":1048576,\"proto\":1,\"tls_required\":false,\"headers\":true}}\r\n"
    );
    if stream.write_all(info.as_bytes()).await.is_err() {
        return;
    }

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutFrame>();
    let (mut read_half, mut write_half) = stream.into_split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match frame {
                OutFrame::Ack => {
                    if write_half.write_all(b"+OK\r\n").await.is_err() {
                        return;
                    }
                }
                OutFrame::Msg(msg) => {
                    let header_line = match &msg.reply_to {
                        Some(reply) => format!(
                            "MSG {} {} {} {}\r\n",
                            msg.subject,
                            msg.sid,
                            reply,
                            msg.payload.len()
                        ),
                        None => format!("MSG {} {} {}\r\n", msg.subject, msg.sid, msg.payload.len()),
                    };
                    if write_half.write_all(header_line.as_bytes()).await.is_err() {
                        return;
                    }
                    if write_half.write_all(&msg.payload).await.is_err() {
                        return;
                    }
                    if write_half.write_all(b"\r\n").await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    let mut buf = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 8192];
    loop {
        let n = tokio::select! {
            biased;
            _ = &mut kill_rx => break,
            result = read_half.read(&mut read_buf) => match result {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            },
        };
        buf.extend_from_slice(&read_buf[..n]);

        loop {
            let Some(line_end) = find_crlf(&buf) else { break };
            let line = String::from_utf8_lossy(&buf[..line_end]).to_string();
            let mut parts = line.splitn(2, char::is_whitespace);
            let op = parts.next().unwrap_or("").to_ascii_uppercase();
            let rest = parts.next().unwrap_or("").trim_start().to_owned();

            match op.as_str() {
                "CONNECT" => {
                    buf.advance(line_end + 2);
                    // A real server only acks CONNECT when the client asked
                    // for verbose mode; acking unconditionally is safe here
                    // because a non-verbose client never registers a waiter
                    // for it (`AckQueue::complete_next` on an empty queue is
                    // a no-op).
                    let _ = out_tx.send(OutFrame::Ack);
                }
                "PING" => {
                    // None of the integration scenarios assert on keepalive
                    // round trips against this mock, so a PONG reply is not
                    // wired up; real pong handling lives in pubsub-wire and
                    // is exercised there.
                    buf.advance(line_end + 2);
                }
                "PONG" => {
                    buf.advance(line_end + 2);
                }
                "SUB" => {
                    buf.advance(line_end + 2);
                    let tokens: Vec<&str> = rest.split_whitespace().collect();
                    if let [subject, sid] = tokens[..] {
                        if let Ok(sid) = sid.parse::<u64>() {
                            broker
                                .lock()
                                .await
                                .subscribe(conn_id, sid, subject, out_tx.clone());
                        }
                    } else if let [subject, _queue, sid] = tokens[..] {
                        if let Ok(sid) = sid.parse::<u64>() {
                            broker
                                .lock()
                                .await
                                .subscribe(conn_id, sid, subject, out_tx.clone());
                        }
                    }
                }
                "UNSUB" => {
                    buf.advance(line_end + 2);
                    if let Some(sid_str) = rest.split_whitespace().next() {
                        if let Ok(sid) = sid_str.parse::<u64>() {
                            broker.lock().await.unsubscribe(conn_id, sid);
                        }
                    }
                }
                "PUB" => {
                    let tokens: Vec<&str> = rest.split_whitespace().collect();
                    let Some(&len_str) = tokens.last() else {
                        buf.advance(line_end + 2);
                        continue;
                    };
                    let Ok(len) = len_str.parse::<usize>() else {
                        buf.advance(line_end + 2);
                        continue;
                    };
                    let frame_end = line_end + 2 + len + 2;
                    if buf.len() < frame_end {
                        break;
                    }
                    let payload = buf[line_end + 2..line_end + 2 + len].to_vec();
                    let (subject, reply_to) = match tokens.len() {
                        2 => (tokens[0], None),
                        3 => (tokens[0], Some(tokens[1].to_owned())),
                        _ => ("", None),
                    };
                    broker.lock().await.publish(subject, reply_to, &payload);
                    buf.advance(frame_end);
                    let _ = out_tx.send(OutFrame::Ack);
                }
                _ => {
                    debug!(op = %op, "mock server ignoring unknown opcode");
                    buf.advance(line_end + 2);
                }
            }
        }
    }

    broker.lock().await.drop_connection(conn_id);
    drop(out_tx);
    let _ = writer.await;
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        let star = vec!["subject1".to_owned(), "*".to_owned()];
        assert!(subject_matches(&star, &["subject1", "1"]));
        assert!(!subject_matches(&star, &["subject1", "1", "2"]));

        let tail = vec!["subject1".to_owned(), ">".to_owned()];
        assert!(subject_matches(&tail, &["subject1", "1", "2"]));
    }
}
