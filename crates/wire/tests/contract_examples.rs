//! End-to-end wire format fixtures covering the framing edge cases called
//! out in the design: payloads containing CR/LF/CRLF, zero-length
//! payloads, large payloads, and the full 0-255 byte range.

use bytes::{Bytes, BytesMut};
use pubsub_wire::{ClientOp, ServerOp, WireCodec};
use tokio_util::codec::{Decoder, Encoder};

fn decode_one(bytes: &[u8]) -> ServerOp {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from(bytes);
    codec
        .decode(&mut buf)
        .expect("decode")
        .expect("one complete frame")
}

#[test]
fn large_payload_round_trips_byte_for_byte() {
    let payload: Vec<u8> = (0..5120u32).map(|i| (i % 256) as u8).collect();
    let mut buf = BytesMut::new();
    let mut codec = WireCodec::new();
    codec
        .encode(
            ClientOp::Pub {
                subject: "subject1".to_owned(),
                reply_to: None,
                payload: Bytes::from(payload.clone()),
            },
            &mut buf,
        )
        .unwrap();

    // Re-frame the PUB as if it were a server MSG (same payload framing rule).
    let as_msg = format!("MSG subject1 42 {}\r\n", payload.len());
    let mut server_frame = BytesMut::from(as_msg.as_bytes());
    server_frame.extend_from_slice(&payload);
    server_frame.extend_from_slice(b"\r\n");

    match decode_one(&server_frame) {
        ServerOp::Msg { payload: p, .. } => assert_eq!(p.as_ref(), payload.as_slice()),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn payload_with_embedded_delimiters_and_full_byte_range() {
    let payload: Vec<u8> = vec![
        0x01, 0x0A, 0x03, 0x0D, 0x0A, 0x0D, 0x82, 0x01, 0x0A, 0x03, 0x0D, 0x0A, 0x0D, 0x82,
    ];
    let mut frame = format!("MSG subject1 1 {}\r\n", payload.len()).into_bytes();
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(b"\r\n");
    match decode_one(&frame) {
        ServerOp::Msg { payload: p, .. } => assert_eq!(p.as_ref(), payload.as_slice()),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn full_0_255_byte_range_round_trips() {
    let payload: Vec<u8> = (0..=255u16).map(|b| b as u8).collect();
    let mut frame = format!("MSG s 1 {}\r\n", payload.len()).into_bytes();
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(b"\r\n");
    match decode_one(&frame) {
        ServerOp::Msg { payload: p, .. } => assert_eq!(p.as_ref(), payload.as_slice()),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn zero_length_payload_round_trips() {
    match decode_one(b"MSG s 1 0\r\n\r\n") {
        ServerOp::Msg { payload, .. } => assert!(payload.is_empty()),
        other => panic!("unexpected: {other:?}"),
    }
}
