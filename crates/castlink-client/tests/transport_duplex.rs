//! Link over an in-memory byte stream: framing, reassembly and termination.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::BytesMut;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use castlink_client::{CloseReason, Link};
use castlink_core::protocol::namespace::{CONNECTION, RECEIVER, RECEIVER_ID, SENDER_ID};
use castlink_core::protocol::{encode_frame, Envelope, FrameDecoder};

use harness::{config, inbound, sent};

/// The receiver's end of the stream.
struct Peer {
    io: DuplexStream,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl Peer {
    fn new(io: DuplexStream) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
            decoder: FrameDecoder::default(),
        }
    }

    async fn recv(&mut self) -> Envelope {
        loop {
            if let Some(env) = self.decoder.decode(&mut self.buf).unwrap() {
                return env;
            }
            let n = self.io.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "link closed the stream");
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
        self.io.flush().await.unwrap();
    }
}

fn connected() -> (Link, Peer) {
    let (client, server) = duplex(4096);
    (Link::over_stream(client, &config()), Peer::new(server))
}

#[tokio::test]
async fn request_reply_survives_split_writes() {
    let (link, mut peer) = connected();
    let ch = link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();

    let connect = sent(peer.recv().await);
    assert_eq!(connect.namespace, CONNECTION);
    assert_eq!(connect.msg_type(), "CONNECT");

    let task = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send_and_await("GET_STATUS", Value::Null).await }
    });
    let request = sent(peer.recv().await);
    assert_eq!(request.msg_type(), "GET_STATUS");
    let id = request.request_id().unwrap();

    let reply = inbound(
        RECEIVER_ID,
        SENDER_ID,
        RECEIVER,
        json!({"type": "RECEIVER_STATUS", "requestId": id, "status": {"applications": []}}),
    );
    let frame = encode_frame(&reply).unwrap();
    // Header split across writes, then the body in two pieces.
    peer.send_raw(&frame[..2]).await;
    tokio::task::yield_now().await;
    peer.send_raw(&frame[2..9]).await;
    tokio::task::yield_now().await;
    peer.send_raw(&frame[9..]).await;

    let msg = task.await.unwrap().unwrap();
    assert_eq!(msg.msg_type(), "RECEIVER_STATUS");
    assert_eq!(msg.request_id(), Some(id));
}

#[tokio::test]
async fn frames_in_one_write_arrive_in_order() {
    let (link, mut peer) = connected();
    let ch = link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();
    let mut stream = Box::pin(ch.stream());
    peer.recv().await;

    let mut batch = Vec::new();
    for kind in ["FIRST", "SECOND", "THIRD"] {
        let env = inbound(RECEIVER_ID, SENDER_ID, RECEIVER, json!({"type": kind}));
        batch.extend_from_slice(&encode_frame(&env).unwrap());
    }
    peer.send_raw(&batch).await;

    for kind in ["FIRST", "SECOND", "THIRD"] {
        assert_eq!(stream.next().await.unwrap().msg_type(), kind);
    }
}

#[tokio::test]
async fn remote_close_terminates_once() {
    let (link, mut peer) = connected();
    let ch = link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();
    peer.recv().await;

    drop(peer);

    assert_eq!(link.closed().await, CloseReason::RemoteClosed);
    assert!(link.is_closed());
    assert!(ch.is_closed());
    assert_eq!(ch.send("GET_STATUS", Value::Null).unwrap_err().code().as_str(), "CLOSED");
    // A later local close does not overwrite the reason.
    link.close();
    assert_eq!(link.closed().await, CloseReason::RemoteClosed);
}

#[tokio::test]
async fn oversized_frame_is_fatal() {
    let (link, mut peer) = connected();
    peer.send_raw(&[0xff, 0xff, 0xff, 0xff, 0x00]).await;

    match link.closed().await {
        CloseReason::Frame(_) => {}
        other => panic!("expected frame error, got {other:?}"),
    }
    assert_eq!(
        CloseReason::Frame(String::new()).into_error().code().as_str(),
        "FRAME"
    );
}

#[tokio::test]
async fn pending_request_fails_when_socket_drops() {
    let (link, mut peer) = connected();
    let ch = link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();
    peer.recv().await;

    let task = tokio::spawn({
        let ch = ch.clone();
        async move { ch.send_and_await("GET_STATUS", Value::Null).await }
    });
    peer.recv().await;
    drop(peer);

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.code().as_str(), "CLOSED");
    assert_eq!(link.closed().await, CloseReason::RemoteClosed);
}

#[tokio::test]
async fn local_close_releases_the_stream() {
    let (link, mut peer) = connected();
    link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();
    peer.recv().await;

    link.close();

    let mut scratch = [0u8; 16];
    let n = peer.io.read(&mut scratch).await.unwrap();
    assert_eq!(n, 0);
}

impl Peer {
    /// Message types of every frame until the link shuts the stream down.
    async fn read_to_eof(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            if let Some(env) = self.decoder.decode(&mut self.buf).unwrap() {
                seen.push(sent(env).msg_type().to_owned());
                continue;
            }
            if self.io.read_buf(&mut self.buf).await.unwrap() == 0 {
                return seen;
            }
        }
    }
}

#[tokio::test]
async fn local_close_writes_queued_frames_before_eof() {
    let (link, mut peer) = connected();
    let ch = link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();
    ch.close();
    link.close();

    assert_eq!(peer.read_to_eof().await, ["CONNECT", "CLOSE"]);
    assert_eq!(link.closed().await, CloseReason::Local);
}

#[tokio::test]
async fn close_and_flush_says_goodbye_per_endpoint_pair() {
    let (link, mut peer) = connected();
    link.open_channel(SENDER_ID, RECEIVER_ID, RECEIVER).unwrap();
    link.open_channel(SENDER_ID, RECEIVER_ID, "urn:x-cast:com.example.custom").unwrap();

    link.close_and_flush().await;

    assert_eq!(peer.read_to_eof().await, ["CONNECT", "CONNECT", "CLOSE"]);
    assert_eq!(link.channel_count(), 0);
}
