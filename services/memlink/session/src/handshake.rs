//! Version handshake for companion sessions.
//!
//! This module implements the REQUEST_VERSION exchange that occurs
//! immediately after the connection is established.

use crate::error::ClientError;
use crate::exchange::{round_trip, RoundTripTimeouts};
use memlink_wire::{NegotiatedLimits, RequestFrame, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Request the peer's protocol version and capacity limits
pub async fn request_version<S>(
    stream: &mut S,
    timeouts: &RoundTripTimeouts,
) -> Result<NegotiatedLimits, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = RequestFrame::version_request();

    let limits = match round_trip(stream, &frame, timeouts).await? {
        Response::Version(limits) => limits,
        Response::Results(_) => {
            return Err(ClientError::Protocol(memlink_wire::WireError::Malformed(
                "command results in reply to version request",
            )))
        }
    };
    limits.validate().map_err(ClientError::Protocol)?;

    debug!("Protocol version: {}", limits.protocol_version);
    debug!("Max input bytes: {}", limits.max_input_bytes);
    debug!("Max output bytes: {}", limits.max_output_bytes);
    debug!("Max addresses: {}", limits.max_addresses);

    Ok(limits)
}
