//! TCP transport, version handshake, connection lifecycle and serialized
//! request exchange for memlink.
//!
//! This crate owns the connection to the companion process that exposes
//! console memory over TCP. A [`ConnectionManager`] holds at most one
//! [`Session`]; every request takes the manager's lock for its full round
//! trip, and any transport or protocol fault drops the session so that the
//! caller has to reconnect.
//!
//! ## Example
//!
//! ```rust,no_run
//! use memlink_session::{ConnectionManager, RemoteConfig};
//! use memlink_wire::{Operation, RequestFrame};
//!
//! # async fn example() -> Result<(), memlink_session::ClientError> {
//! let manager = ConnectionManager::new(RemoteConfig::default());
//! manager.set_endpoint(Some("192.168.1.50".to_string())).await;
//!
//! let limits = manager.connect().await?;
//! println!("Peer accepts {} addresses per frame", limits.max_addresses);
//!
//! let frame = RequestFrame::commands(
//!     vec![0x8000_0000],
//!     vec![Operation::read(0, 6, None).map_err(memlink_session::ClientError::Validation)?],
//! )
//! .map_err(memlink_session::ClientError::Validation)?;
//! let results = manager.execute(&frame).await?;
//! println!("Game ID bytes: {:?}", results[0]);
//!
//! manager.disconnect().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod exchange;
pub mod handshake;
pub mod manager;
pub mod session;
pub mod transport;

// Re-export main types
pub use error::{CapacityError, ClientError, Result, Stage};
pub use exchange::{round_trip, RoundTripTimeouts};
pub use handshake::request_version;
pub use manager::ConnectionManager;
pub use session::{check_capacity, RemoteConfig, Session, SessionStats};
pub use transport::connect_tcp;
