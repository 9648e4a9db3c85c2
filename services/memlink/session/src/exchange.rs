//! Single request/response exchange over the session stream.
//!
//! Callers must hold the connection lock for the whole exchange so that no
//! other request's bytes are interleaved on the wire. Any error returned
//! from here other than a local one leaves the stream in an unknown state
//! and the session must be torn down.

use crate::error::{ClientError, Stage};
use bytes::BytesMut;
use memlink_wire::{RequestFrame, Response, ResponseDecoder};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Bounds for one round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTripTimeouts {
    /// Bound for writing and flushing the request
    pub flush: Duration,
    /// Bound for receiving the complete response
    pub recv: Duration,
}

impl Default for RoundTripTimeouts {
    fn default() -> Self {
        Self {
            flush: Duration::from_secs(2),
            recv: Duration::from_secs(2),
        }
    }
}

/// Send `frame` and wait for its decoded response
pub async fn round_trip<S>(
    stream: &mut S,
    frame: &RequestFrame,
    timeouts: &RoundTripTimeouts,
) -> Result<Response, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = frame.encode();
    trace!("Sending {} byte request: {:02x?}", request.len(), &request[..]);

    tokio::time::timeout(timeouts.flush, async {
        stream.write_all(&request).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| ClientError::Timeout(Stage::Flush))??;

    let decoder = ResponseDecoder::for_frame(frame);
    let mut buffer = BytesMut::with_capacity(frame.max_response_size());

    tokio::time::timeout(timeouts.recv, recv_response(stream, &decoder, &mut buffer))
        .await
        .map_err(|_| ClientError::Timeout(Stage::Receive))?
}

/// Read until the decoder has a complete response
async fn recv_response<R>(
    reader: &mut R,
    decoder: &ResponseDecoder,
    buffer: &mut BytesMut,
) -> Result<Response, ClientError>
where
    R: AsyncRead + Unpin,
{
    loop {
        // A frame without operations is answered by zero bytes
        if let Some(response) = decoder.decode(buffer).map_err(ClientError::Protocol)? {
            return Ok(response);
        }

        let bytes_read = reader.read_buf(buffer).await?;
        if bytes_read == 0 {
            return Err(ClientError::Closed);
        }

        trace!(
            "Read {} bytes, buffer now has {} bytes",
            bytes_read,
            buffer.len()
        );
    }
}
