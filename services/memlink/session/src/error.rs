//! Session error types.

use memlink_wire::WireError;
use std::fmt;
use thiserror::Error;

/// Round-trip stage a timeout fired in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Opening the TCP connection
    Connect,
    /// Writing and flushing the request
    Flush,
    /// Waiting for the complete response
    Receive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => write!(f, "connect"),
            Stage::Flush => write!(f, "flush"),
            Stage::Receive => write!(f, "receive"),
        }
    }
}

/// Negotiated limit a request would exceed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    /// Address table larger than the peer accepts
    #[error("too many addresses: max is {max}, got {got}")]
    Addresses {
        /// Negotiated maximum
        max: usize,
        /// Requested
        got: usize,
    },
    /// Request frame longer than the peer accepts
    #[error("command too long: max {max} bytes, got {got}")]
    Input {
        /// Negotiated maximum
        max: usize,
        /// Requested
        got: usize,
    },
    /// Response could exceed what the peer produces
    #[error("response too long: max {max} bytes, could be {got}")]
    Output {
        /// Negotiated maximum
        max: usize,
        /// Worst case for the request
        got: usize,
    },
}

/// Errors raised by the remote memory client
#[derive(Error, Debug)]
pub enum ClientError {
    /// No endpoint, connect failure, handshake failure, or no open session
    #[error("connection error: {0}")]
    Connection(String),

    /// Response did not match the request
    #[error("protocol error: {0}")]
    Protocol(WireError),

    /// A round-trip stage exceeded its bound
    #[error("{0} timed out")]
    Timeout(Stage),

    /// Peer closed the connection
    #[error("connection was closed")]
    Closed,

    /// Transport I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request exceeds negotiated limits; nothing was sent
    #[error("capacity exceeded: {0}")]
    Capacity(#[from] CapacityError),

    /// Peer reported the span unreadable
    #[error("{address:x} -> {end:x} is not valid memory")]
    RemoteFault {
        /// Start of the span
        address: u32,
        /// End of the span (exclusive)
        end: u64,
    },

    /// Request could not be built
    #[error("invalid request: {0}")]
    Validation(WireError),
}

impl ClientError {
    /// Whether this error tears the session down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_)
                | ClientError::Protocol(_)
                | ClientError::Timeout(_)
                | ClientError::Closed
                | ClientError::Io(_)
        )
    }

    /// Remote fault for the span `[address, address + len)`
    pub fn remote_fault(address: u32, len: usize) -> Self {
        ClientError::RemoteFault {
            address,
            end: (address as u64).saturating_add(len as u64),
        }
    }

    pub(crate) fn not_connected() -> Self {
        ClientError::Connection("not connected".to_string())
    }
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
