use crate::header::Header;
use crate::message::{ConnectOptions, Info};
use crate::{Sid, Subject};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::str;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed command line: {0}")]
    Malformed(String),
    #[error("invalid INFO payload: {0}")]
    Info(#[from] serde_json::Error),
    #[error("non-utf8 command line")]
    NotUtf8(#[from] str::Utf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded server protocol op.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOp {
    Info(Box<Info>),
    Msg {
        subject: Subject,
        sid: Sid,
        reply_to: Option<String>,
        payload: Bytes,
    },
    HMsg {
        subject: Subject,
        sid: Sid,
        reply_to: Option<String>,
        header: Header,
        payload: Bytes,
    },
    Ping,
    Pong,
    Ok,
    Err(String),
}

/// An outbound client protocol op.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOp {
    Connect(Box<ConnectOptions>),
    Pub {
        subject: Subject,
        reply_to: Option<String>,
        payload: Bytes,
    },
    HPub {
        subject: Subject,
        reply_to: Option<String>,
        header: Header,
        payload: Bytes,
    },
    Sub {
        subject: Subject,
        queue_group: Option<String>,
        sid: Sid,
    },
    Unsub {
        sid: Sid,
        max_msgs: Option<u64>,
    },
    Ping,
    Pong,
}

/// The frame codec for the line-oriented protocol: one [`Decoder`] impl for
/// server ops, one [`Encoder`] impl for client ops, sharing a single type
/// so a `Framed<_, WireCodec>` speaks both directions.
#[derive(Debug, Default)]
pub struct WireCodec {
    _private: (),
}

impl WireCodec {
    pub fn new() -> Self {
        WireCodec { _private: () }
    }
}

/// Index just past the first `\r\n` in `buf`, i.e. the start of whatever
/// follows the command line.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn split_ws(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

impl Decoder for WireCodec {
    type Item = ServerOp;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ServerOp>, WireError> {
        loop {
            let Some(line_end) = find_crlf(&src[..]) else {
                return Ok(None);
            };
            let line = str::from_utf8(&src[..line_end])?;
            let mut split = line.splitn(2, char::is_whitespace);
            let opcode = split.next().unwrap_or("");
            let rest = split.next().unwrap_or("").trim_start();
            let opcode_upper = opcode.to_ascii_uppercase();

            match opcode_upper.as_str() {
                "INFO" => {
                    let info: Info = serde_json::from_str(rest)?;
                    src.advance(line_end + 2);
                    return Ok(Some(ServerOp::Info(Box::new(info))));
                }
                "PING" => {
                    src.advance(line_end + 2);
                    return Ok(Some(ServerOp::Ping));
                }
                "PONG" => {
                    src.advance(line_end + 2);
                    return Ok(Some(ServerOp::Pong));
                }
                "+OK" => {
                    src.advance(line_end + 2);
                    return Ok(Some(ServerOp::Ok));
                }
                "-ERR" => {
                    let reason = rest.trim_matches('\'').to_owned();
                    src.advance(line_end + 2);
                    return Ok(Some(ServerOp::Err(reason)));
                }
                "MSG" => {
                    let tokens = split_ws(rest);
                    let (subject, sid, reply_to, payload_len) = parse_msg_args(&tokens)?;
                    let frame_end = line_end + 2 + payload_len + 2;
                    if src.len() < frame_end {
                        return Ok(None);
                    }
                    let payload =
                        Bytes::copy_from_slice(&src[line_end + 2..line_end + 2 + payload_len]);
                    src.advance(frame_end);
                    return Ok(Some(ServerOp::Msg {
                        subject,
                        sid,
                        reply_to,
                        payload,
                    }));
                }
                "HMSG" => {
                    let tokens = split_ws(rest);
                    let (subject, sid, reply_to, header_len, total_len) =
                        parse_hmsg_args(&tokens)?;
                    if total_len < header_len {
                        return Err(WireError::Malformed(format!(
                            "HMSG total_len {total_len} < header_len {header_len}"
                        )));
                    }
                    let frame_end = line_end + 2 + total_len + 2;
                    if src.len() < frame_end {
                        return Ok(None);
                    }
                    let body_start = line_end + 2;
                    let header = Header::from_bytes(&src[body_start..body_start + header_len]);
                    let payload = Bytes::copy_from_slice(
                        &src[body_start + header_len..body_start + total_len],
                    );
                    src.advance(frame_end);
                    return Ok(Some(ServerOp::HMsg {
                        subject,
                        sid,
                        reply_to,
                        header,
                        payload,
                    }));
                }
                _ => {
                    // Unknown opcode: drop the line and keep scanning.
                    src.advance(line_end + 2);
                    continue;
                }
            }
        }
    }
}

fn parse_msg_args(tokens: &[&str]) -> Result<(Subject, Sid, Option<String>, usize), WireError> {
    match tokens {
        [subject, sid, len] => Ok((
            (*subject).to_owned(),
            parse_u64(sid)?,
            None,
            parse_len(len)?,
        )),
        [subject, sid, reply_to, len] => Ok((
            (*subject).to_owned(),
            parse_u64(sid)?,
            Some((*reply_to).to_owned()),
            parse_len(len)?,
        )),
        _ => Err(WireError::Malformed(format!(
            "MSG: expected 3 or 4 args, got {}",
            tokens.len()
        ))),
    }
}

#[allow(clippy::type_complexity)]
fn parse_hmsg_args(
    tokens: &[&str],
) -> Result<(Subject, Sid, Option<String>, usize, usize), WireError> {
    match tokens {
        [subject, sid, hlen, total] => Ok((
            (*subject).to_owned(),
            parse_u64(sid)?,
            None,
            parse_len(hlen)?,
            parse_len(total)?,
        )),
        [subject, sid, reply_to, hlen, total] => Ok((
            (*subject).to_owned(),
            parse_u64(sid)?,
            Some((*reply_to).to_owned()),
            parse_len(hlen)?,
            parse_len(total)?,
        )),
        _ => Err(WireError::Malformed(format!(
            "HMSG: expected 4 or 5 args, got {}",
            tokens.len()
        ))),
    }
}

fn parse_u64(s: &str) -> Result<u64, WireError> {
    s.parse()
        .map_err(|_| WireError::Malformed(format!("expected integer, got '{s}'")))
}

fn parse_len(s: &str) -> Result<usize, WireError> {
    s.parse()
        .map_err(|_| WireError::Malformed(format!("expected length, got '{s}'")))
}

impl Encoder<ClientOp> for WireCodec {
    type Error = WireError;

    fn encode(&mut self, item: ClientOp, dst: &mut BytesMut) -> Result<(), WireError> {
        match item {
            ClientOp::Connect(opts) => {
                let json = serde_json::to_string(&opts)?;
                dst.put_slice(b"CONNECT ");
                dst.put_slice(json.as_bytes());
                dst.put_slice(b"\r\n");
            }
            ClientOp::Pub {
                subject,
                reply_to,
                payload,
            } => {
                dst.put_slice(b"PUB ");
                dst.put_slice(subject.as_bytes());
                dst.put_u8(b' ');
                if let Some(reply) = &reply_to {
                    dst.put_slice(reply.as_bytes());
                    dst.put_u8(b' ');
                }
                dst.put_slice(payload.len().to_string().as_bytes());
                dst.put_slice(b"\r\n");
                dst.put_slice(&payload);
                dst.put_slice(b"\r\n");
            }
            ClientOp::HPub {
                subject,
                reply_to,
                header,
                payload,
            } => {
                let header_bytes = header.to_bytes();
                let hlen = header_bytes.len();
                let total = hlen + payload.len();
                dst.put_slice(b"HPUB ");
                dst.put_slice(subject.as_bytes());
                dst.put_u8(b' ');
                if let Some(reply) = &reply_to {
                    dst.put_slice(reply.as_bytes());
                    dst.put_u8(b' ');
                }
                dst.put_slice(hlen.to_string().as_bytes());
                dst.put_u8(b' ');
                dst.put_slice(total.to_string().as_bytes());
                dst.put_slice(b"\r\n");
                dst.put_slice(&header_bytes);
                dst.put_slice(&payload);
                dst.put_slice(b"\r\n");
            }
            ClientOp::Sub {
                subject,
                queue_group,
                sid,
            } => {
                dst.put_slice(b"SUB ");
                dst.put_slice(subject.as_bytes());
                dst.put_u8(b' ');
                if let Some(group) = &queue_group {
                    dst.put_slice(group.as_bytes());
                    dst.put_u8(b' ');
                }
                dst.put_slice(sid.to_string().as_bytes());
                dst.put_slice(b"\r\n");
            }
            ClientOp::Unsub { sid, max_msgs } => {
                dst.put_slice(b"UNSUB ");
                dst.put_slice(sid.to_string().as_bytes());
                if let Some(max) = max_msgs {
                    dst.put_u8(b' ');
                    dst.put_slice(max.to_string().as_bytes());
                }
                dst.put_slice(b"\r\n");
            }
            ClientOp::Ping => dst.put_slice(b"PING\r\n"),
            ClientOp::Pong => dst.put_slice(b"PONG\r\n"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<ServerOp> {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(op) = codec.decode(&mut buf).unwrap() {
            out.push(op);
        }
        out
    }

    #[test]
    fn decodes_ping_pong_ok_err() {
        let ops = decode_all(b"PING\r\nPONG\r\n+OK\r\n-ERR 'bad subject'\r\n");
        assert_eq!(
            ops,
            vec![
                ServerOp::Ping,
                ServerOp::Pong,
                ServerOp::Ok,
                ServerOp::Err("bad subject".to_owned())
            ]
        );
    }

    #[test]
    fn unknown_opcode_is_dropped_silently() {
        let ops = decode_all(b"BOGUS some args\r\nPING\r\n");
        assert_eq!(ops, vec![ServerOp::Ping]);
    }

    #[test]
    fn msg_without_reply_to() {
        let ops = decode_all(b"MSG subject.1 9 11\r\nhello world\r\n");
        assert_eq!(
            ops,
            vec![ServerOp::Msg {
                subject: "subject.1".to_owned(),
                sid: 9,
                reply_to: None,
                payload: Bytes::from_static(b"hello world"),
            }]
        );
    }

    #[test]
    fn msg_with_reply_to() {
        let ops = decode_all(b"MSG subject.1 9 reply.1 5\r\nhello\r\n");
        assert_eq!(
            ops,
            vec![ServerOp::Msg {
                subject: "subject.1".to_owned(),
                sid: 9,
                reply_to: Some("reply.1".to_owned()),
                payload: Bytes::from_static(b"hello"),
            }]
        );
    }

    #[test]
    fn msg_waits_for_full_payload() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::from(&b"MSG s 1 11\r\nhello"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" world\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(ServerOp::Msg {
                subject: "s".to_owned(),
                sid: 1,
                reply_to: None,
                payload: Bytes::from_static(b"hello world"),
            })
        );
    }

    #[test]
    fn payload_may_contain_crlf_and_full_byte_range() {
        let payload: Vec<u8> = vec![0x01, 0x0A, 0x03, 0x0D, 0x0A, 0x0D, 0x82, 0x01, 0x0A, 0x03];
        let mut frame = format!("MSG s 1 {}\r\n", payload.len()).into_bytes();
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(b"\r\n");
        let ops = decode_all(&frame);
        match &ops[0] {
            ServerOp::Msg { payload: p, .. } => assert_eq!(p.as_ref(), payload.as_slice()),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn zero_length_payload() {
        let ops = decode_all(b"MSG s 1 0\r\n\r\n");
        match &ops[0] {
            ServerOp::Msg { payload, .. } => assert_eq!(payload.len(), 0),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn hmsg_splits_header_and_payload_by_total_len() {
        let mut header = Header::new();
        header.insert("X-Id", "42");
        let header_bytes = header.to_bytes();
        let payload = b"body-bytes";
        let total = header_bytes.len() + payload.len();
        let mut frame = format!(
            "HMSG subject.1 7 reply.1 {} {}\r\n",
            header_bytes.len(),
            total
        )
        .into_bytes();
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");

        let ops = decode_all(&frame);
        match &ops[0] {
            ServerOp::HMsg {
                subject,
                sid,
                reply_to,
                header: h,
                payload: p,
            } => {
                assert_eq!(subject, "subject.1");
                assert_eq!(*sid, 7);
                assert_eq!(reply_to.as_deref(), Some("reply.1"));
                assert_eq!(h.get("X-Id"), Some("42"));
                assert_eq!(p.as_ref(), payload);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn info_parses_json_and_ignores_unknown_fields() {
        let ops = decode_all(b"INFO {\"server_id\":\"abc\",\"max_payload\":1024,\"extra_field\":true}\r\n");
        match &ops[0] {
            ServerOp::Info(info) => {
                assert_eq!(info.server_id, "abc");
                assert_eq!(info.max_payload, 1024);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn encodes_pub_and_hpub() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                ClientOp::Pub {
                    subject: "foo".to_owned(),
                    reply_to: Some("bar".to_owned()),
                    payload: Bytes::from_static(b"data"),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"PUB foo bar 4\r\ndata\r\n");

        buf.clear();
        let mut header = Header::new();
        header.insert("K", "V");
        let header_len = header.to_bytes().len();
        codec
            .encode(
                ClientOp::HPub {
                    subject: "foo".to_owned(),
                    reply_to: None,
                    header,
                    payload: Bytes::from_static(b"xy"),
                },
                &mut buf,
            )
            .unwrap();
        let expected_prefix = format!("HPUB foo {} {}\r\n", header_len, header_len + 2);
        assert!(str::from_utf8(&buf[..expected_prefix.len()]).unwrap() == expected_prefix);
    }

    #[test]
    fn encodes_sub_and_unsub() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                ClientOp::Sub {
                    subject: "foo.*".to_owned(),
                    queue_group: Some("workers".to_owned()),
                    sid: 3,
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"SUB foo.* workers 3\r\n");

        buf.clear();
        codec
            .encode(ClientOp::Unsub { sid: 3, max_msgs: Some(5) }, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"UNSUB 3 5\r\n");
    }
}
