//! Reader/writer tasks over any byte stream.
//!
//! - Reader: drains every complete frame buffered after each read, in wire
//!   order, and keeps partial frames for the next read.
//! - Writer: one frame per `write_all`, so frames never interleave. On a
//!   local close it writes what is still queued, then shuts the stream down.
//! - Socket error, EOF and bad frames are terminal and reported once.

use std::sync::Weak;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use castlink_core::protocol::{encode_frame, Envelope, FrameDecoder};

use crate::link::{self, CloseReason, LinkInner};

const READ_CHUNK: usize = 4096;

pub(crate) fn spawn<S>(
    stream: S,
    weak: Weak<LinkInner>,
    closed: watch::Receiver<Option<CloseReason>>,
    out_rx: mpsc::UnboundedReceiver<Envelope>,
    max_frame_bytes: usize,
) -> (JoinHandle<()>, JoinHandle<()>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let read_task = tokio::spawn(read_loop(reader, weak.clone(), FrameDecoder::new(max_frame_bytes)));
    let write_task = tokio::spawn(write_loop(writer, out_rx, closed, weak));
    (read_task, write_task)
}

async fn read_loop<S: AsyncRead>(mut reader: ReadHalf<S>, weak: Weak<LinkInner>, decoder: FrameDecoder) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let reason = 'read: loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break CloseReason::RemoteClosed,
            Ok(_) => {}
            Err(e) => break CloseReason::Socket(e.to_string()),
        }

        loop {
            match decoder.decode(&mut buf) {
                Ok(Some(env)) => {
                    if !link::deliver(&weak, env) {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => break 'read CloseReason::Frame(e.to_string()),
            }
        }
    };

    link::terminate(&weak, reason);
}

async fn write_loop<S: AsyncWrite>(
    mut writer: WriteHalf<S>,
    mut out_rx: mpsc::UnboundedReceiver<Envelope>,
    mut closed: watch::Receiver<Option<CloseReason>>,
    weak: Weak<LinkInner>,
) {
    loop {
        tokio::select! {
            biased;
            env = out_rx.recv() => {
                // `None`: the link is gone and the queue is empty.
                let Some(env) = env else { break };
                if let Err(e) = write_frame(&mut writer, &env).await {
                    link::terminate(&weak, CloseReason::Socket(e.to_string()));
                    return;
                }
            }
            _ = closed_signal(&mut closed) => {
                // No new sends are accepted past this point; flush the rest.
                while let Ok(env) = out_rx.try_recv() {
                    if let Err(e) = write_frame(&mut writer, &env).await {
                        tracing::debug!(error = %e, "flush after close failed");
                        return;
                    }
                }
                break;
            }
        }
    }

    // Best-effort TLS close_notify / EOF for the peer.
    let _ = writer.shutdown().await;
}

async fn write_frame<S: AsyncWrite>(writer: &mut WriteHalf<S>, env: &Envelope) -> std::io::Result<()> {
    let frame = match encode_frame(env) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(namespace = %env.namespace, error = %e, "outbound envelope dropped");
            return Ok(());
        }
    };
    writer.write_all(&frame).await?;
    writer.flush().await
}

async fn closed_signal(closed: &mut watch::Receiver<Option<CloseReason>>) {
    // The borrow guard must not outlive this call: the link writes to the
    // watch again on a later terminate.
    let _ = closed.wait_for(Option::is_some).await;
}
