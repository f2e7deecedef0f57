//! Body Streams
//!
//! Streaming byte bodies shared by origin responses, stores and the HTTP
//! layer, plus the tee used to store a body while forwarding it.

use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{stream, Stream, StreamExt};
use tokio::sync::mpsc;

/// A boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Chunks buffered per tee branch before the pump waits on the slower side.
const TEE_BUFFER: usize = 16;

/// Wraps a complete payload into a single-chunk body.
pub fn full(bytes: impl Into<Bytes>) -> BodyStream {
    let bytes = bytes.into();
    Box::pin(stream::once(async move { Ok(bytes) }))
}

/// Drains a body into one contiguous buffer.
pub async fn collect(mut body: BodyStream) -> io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

// == Tee ==
/// Splits one body into two independent bodies carrying the same bytes.
///
/// A pump task copies each chunk into two bounded channels, so the payload is
/// never held in full. If one branch is dropped the other keeps receiving;
/// a source error is delivered to both branches and ends the pump.
pub fn tee(mut source: BodyStream) -> (BodyStream, BodyStream) {
    let (left_tx, left_rx) = mpsc::channel::<io::Result<Bytes>>(TEE_BUFFER);
    let (right_tx, right_rx) = mpsc::channel::<io::Result<Bytes>>(TEE_BUFFER);

    tokio::spawn(async move {
        let mut left_open = true;
        let mut right_open = true;

        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    // Bytes clones share the same allocation
                    if left_open && left_tx.send(Ok(bytes.clone())).await.is_err() {
                        left_open = false;
                    }
                    if right_open && right_tx.send(Ok(bytes)).await.is_err() {
                        right_open = false;
                    }
                    if !left_open && !right_open {
                        break;
                    }
                }
                Err(err) => {
                    let kind = err.kind();
                    let message = err.to_string();
                    let _ = left_tx.send(Err(io::Error::new(kind, message.clone()))).await;
                    let _ = right_tx.send(Err(io::Error::new(kind, message))).await;
                    break;
                }
            }
        }
    });

    (receiver_body(left_rx), receiver_body(right_rx))
}

fn receiver_body(rx: mpsc::Receiver<io::Result<Bytes>>) -> BodyStream {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
