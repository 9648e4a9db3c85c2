//! Open companion session: the TCP stream plus the limits negotiated on it.
//!
//! A [`Session`] only exists after both the TCP connect and the version
//! handshake have succeeded, so holding one always means holding valid
//! [`NegotiatedLimits`].

use crate::error::{CapacityError, ClientError};
use crate::exchange::{round_trip, RoundTripTimeouts};
use crate::handshake::request_version;
use crate::transport::connect_tcp;
use memlink_wire::{NegotiatedLimits, RequestFrame, Response, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Configuration for the remote client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Port the companion process listens on
    pub port: u16,
    /// Timeout for opening the TCP connection
    pub connect_timeout: Duration,
    /// Timeout for writing and flushing one request
    pub flush_timeout: Duration,
    /// Timeout for receiving one response
    pub recv_timeout: Duration,
    /// Largest span a single operation covers
    pub chunk_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(2),
            recv_timeout: Duration::from_secs(2),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RemoteConfig {
    /// Round-trip bounds derived from this configuration
    pub fn timeouts(&self) -> RoundTripTimeouts {
        RoundTripTimeouts {
            flush: self.flush_timeout,
            recv: self.recv_timeout,
        }
    }
}

/// Statistics for a connection manager, across sessions
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions opened
    pub connects: u64,
    /// Sessions torn down, by request or by fault
    pub disconnects: u64,
    /// Command frames sent
    pub requests_sent: u64,
    /// Total request bytes sent
    pub bytes_out: u64,
    /// Most recent round-trip time
    pub last_rtt: Option<Duration>,
}

/// Open session
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    limits: NegotiatedLimits,
    peer: SocketAddr,
}

impl Session {
    /// Connect to `host` and perform the version handshake
    ///
    /// On any failure the stream is dropped before returning, so no partial
    /// session survives.
    pub async fn open(host: &str, config: &RemoteConfig) -> Result<Self, ClientError> {
        let mut stream = connect_tcp(host, config.port, config.connect_timeout)
            .await
            .map_err(|e| open_failure(host, config.port, e))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| open_failure(host, config.port, e.into()))?;

        let limits = request_version(&mut stream, &config.timeouts())
            .await
            .map_err(|e| {
                ClientError::Connection(format!("handshake with {} failed: {}", peer, e))
            })?;

        info!(
            "Connected to {} (protocol v{}, {} addresses, {}/{} bytes in/out)",
            peer,
            limits.protocol_version,
            limits.max_addresses,
            limits.max_input_bytes,
            limits.max_output_bytes
        );

        Ok(Self {
            stream,
            limits,
            peer,
        })
    }

    /// Limits negotiated for this session
    pub fn limits(&self) -> NegotiatedLimits {
        self.limits
    }

    /// Peer socket address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send a command frame and wait for its response
    ///
    /// Capacity is checked before any byte is written.
    pub async fn exchange(
        &mut self,
        frame: &RequestFrame,
        timeouts: &RoundTripTimeouts,
        stats: &mut SessionStats,
    ) -> Result<Response, ClientError> {
        check_capacity(&self.limits, frame)?;

        let started = Instant::now();
        let response = round_trip(&mut self.stream, frame, timeouts).await?;

        stats.requests_sent += 1;
        stats.bytes_out += frame.encoded_size() as u64;
        stats.last_rtt = Some(started.elapsed());

        Ok(response)
    }

    /// Close the stream, ignoring errors
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Any failure to open the transport is a connection error
fn open_failure(host: &str, port: u16, err: ClientError) -> ClientError {
    match err {
        ClientError::Connection(_) => err,
        other => ClientError::Connection(format!(
            "could not connect to {}:{}: {}",
            host, port, other
        )),
    }
}

/// Check a frame against negotiated limits
pub fn check_capacity(
    limits: &NegotiatedLimits,
    frame: &RequestFrame,
) -> Result<(), CapacityError> {
    let max_addresses = limits.max_addresses as usize;
    if frame.addresses.len() > max_addresses {
        return Err(CapacityError::Addresses {
            max: max_addresses,
            got: frame.addresses.len(),
        });
    }

    let max_input = limits.max_input_bytes as usize;
    let frame_size = frame.encoded_size();
    if frame_size > max_input {
        warn!("Command too long: {:02x?}", &frame.encode()[..]);
        return Err(CapacityError::Input {
            max: max_input,
            got: frame_size,
        });
    }

    let max_output = limits.max_output_bytes as usize;
    let response_size = frame.max_response_size();
    if response_size > max_output {
        return Err(CapacityError::Output {
            max: max_output,
            got: response_size,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use memlink_wire::Operation;

    fn limits() -> NegotiatedLimits {
        NegotiatedLimits {
            protocol_version: 1,
            max_input_bytes: 32,
            max_output_bytes: 16,
            max_addresses: 2,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RemoteConfig::default();
        assert_eq!(config.port, 43673);
        assert_eq!(config.chunk_size, 80);
        assert_eq!(config.timeouts().recv, Duration::from_secs(2));
    }

    #[test]
    fn test_open_failures_are_connection_errors() {
        use crate::error::Stage;

        let err = open_failure("10.0.0.9", 43673, ClientError::Timeout(Stage::Connect));
        match err {
            ClientError::Connection(message) => {
                assert_eq!(message, "could not connect to 10.0.0.9:43673: connect timed out")
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let io = std::io::Error::new(std::io::ErrorKind::NotConnected, "gone");
        assert!(matches!(
            open_failure("10.0.0.9", 43673, io.into()),
            ClientError::Connection(_)
        ));
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RemoteConfig {
            port: listener.local_addr().unwrap().port(),
            ..RemoteConfig::default()
        };
        drop(listener);

        let result = Session::open("127.0.0.1", &config).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[test]
    fn test_capacity_within_limits() {
        let frame =
            RequestFrame::commands(vec![0x8000_0000], vec![Operation::read(0, 8, None).unwrap()])
                .unwrap();
        assert!(check_capacity(&limits(), &frame).is_ok());
    }

    #[test]
    fn test_capacity_too_many_addresses() {
        let frame = RequestFrame::commands(
            vec![0x8000_0000, 0x8000_0010, 0x8000_0020],
            vec![Operation::read(2, 1, None).unwrap()],
        )
        .unwrap();
        assert_eq!(
            check_capacity(&limits(), &frame),
            Err(CapacityError::Addresses { max: 2, got: 3 })
        );
    }

    #[test]
    fn test_capacity_input_too_long() {
        let data = Bytes::from(vec![0u8; 40]);
        let frame = RequestFrame::commands(
            vec![0x8000_0000],
            vec![Operation::write(0, data, None).unwrap()],
        )
        .unwrap();
        assert_eq!(
            check_capacity(&limits(), &frame),
            Err(CapacityError::Input { max: 32, got: 50 })
        );
    }

    #[test]
    fn test_capacity_output_too_long() {
        let frame =
            RequestFrame::commands(vec![0x8000_0000], vec![Operation::read(0, 20, None).unwrap()])
                .unwrap();
        assert_eq!(
            check_capacity(&limits(), &frame),
            Err(CapacityError::Output { max: 16, got: 21 })
        );
    }
}
