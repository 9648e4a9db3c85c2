//! Connection manager: endpoint, session lifecycle and serialized requests.
//!
//! The manager owns the single [`Session`] of a client. All state sits
//! behind one async mutex; a request holds it for its whole round trip, so
//! at most one request is ever in flight. Every fault path funnels through
//! [`teardown`], which drops the session (and with it the negotiated limits).
//!
//! A caller that is cancelled mid round trip leaves its response unread on
//! the wire. The request is marked in flight while it runs; whoever takes
//! the lock next finds the mark and tears the session down.

use crate::error::ClientError;
use crate::session::{RemoteConfig, Session, SessionStats};
use memlink_wire::{NegotiatedLimits, OperationResult, RequestFrame, Response, WireError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ConnectionState {
    endpoint: Option<String>,
    session: Option<Session>,
    stats: SessionStats,
    in_flight: bool,
}

fn teardown(state: &mut ConnectionState, reason: &str) -> Option<Session> {
    state.in_flight = false;
    let session = state.session.take()?;
    state.stats.disconnects += 1;
    info!("Disconnected from {} ({})", session.peer(), reason);
    Some(session)
}

/// Owner of the companion connection
#[derive(Debug)]
pub struct ConnectionManager {
    config: RemoteConfig,
    state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    /// Create a manager with no endpoint
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Take the state lock, dropping a session whose last request was cancelled
    async fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        let mut state = self.state.lock().await;
        if state.in_flight {
            warn!("Previous request was cancelled mid round trip, tearing down session");
            // The stream still holds that request's response; drop it unread
            teardown(&mut state, "request cancelled");
        }
        state
    }

    /// Set the companion host; a change while connected disconnects first
    pub async fn set_endpoint(&self, endpoint: Option<String>) {
        let mut state = self.lock().await;
        if endpoint != state.endpoint && state.session.is_some() {
            info!("Companion address changed, disconnecting.");
            if let Some(session) = teardown(&mut state, "endpoint changed") {
                session.close().await;
            }
        }
        state.endpoint = endpoint;
    }

    /// Current companion host
    pub async fn endpoint(&self) -> Option<String> {
        self.lock().await.endpoint.clone()
    }

    /// Connect and handshake
    ///
    /// Already being connected is not an error; the existing limits are
    /// returned.
    pub async fn connect(&self) -> Result<NegotiatedLimits, ClientError> {
        let mut state = self.lock().await;
        if let Some(session) = state.session.as_ref() {
            debug!("Already connected to {}", session.peer());
            return Ok(session.limits());
        }

        let endpoint = state
            .endpoint
            .clone()
            .ok_or_else(|| ClientError::Connection("address is not set".to_string()))?;

        let session = Session::open(&endpoint, &self.config).await?;
        let limits = session.limits();
        state.session = Some(session);
        state.stats.connects += 1;
        Ok(limits)
    }

    /// Close the session if one is open; always succeeds
    pub async fn disconnect(&self) {
        let mut state = self.lock().await;
        if let Some(session) = teardown(&mut state, "requested") {
            session.close().await;
        }
    }

    /// Whether a session with valid limits is open
    pub async fn is_connected(&self) -> bool {
        self.lock().await.session.is_some()
    }

    /// Limits of the open session
    pub async fn limits(&self) -> Option<NegotiatedLimits> {
        self.lock()
            .await
            .session
            .as_ref()
            .map(Session::limits)
    }

    /// Snapshot of connection statistics
    pub async fn stats(&self) -> SessionStats {
        self.lock().await.stats.clone()
    }

    /// Run one command frame and return one result per operation
    ///
    /// I/O-adjacent failures tear the session down before the error is
    /// returned; capacity errors leave it open.
    pub async fn execute(&self, frame: &RequestFrame) -> Result<Vec<OperationResult>, ClientError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or_else(ClientError::not_connected)?;

        let timeouts = self.config.timeouts();
        state.in_flight = true;
        let exchanged = session.exchange(frame, &timeouts, &mut state.stats).await;
        state.in_flight = false;

        let result = match exchanged {
            Ok(Response::Results(results)) => Ok(results),
            Ok(Response::Version(_)) => Err(ClientError::Protocol(WireError::Malformed(
                "version reply to command request",
            ))),
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            if e.is_fatal() {
                warn!("Request failed, tearing down session: {}", e);
                // The stream is in an unknown state; drop it without a shutdown
                teardown(state, "fault");
            }
        }

        result
    }
}
