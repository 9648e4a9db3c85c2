//! Network-attached backend speaking the companion protocol.
//!
//! Spans are split by the chunker and every chunk is sent as its own
//! request frame. Results come back in order and are concatenated; the
//! first chunk the peer rejects ends the call.

use crate::{BackendError, GameMemory};
use async_trait::async_trait;
use bytes::Bytes;
use memlink_session::{ClientError, ConnectionManager, RemoteConfig, SessionStats};
use memlink_wire::{
    Chunk, Chunker, NegotiatedLimits, OperationResult, Reassembler, Target, WireError,
};
use tracing::debug;

/// Client for memory exposed by a companion process over TCP
#[derive(Debug)]
pub struct NetworkClient {
    manager: ConnectionManager,
    chunker: Chunker,
}

impl NetworkClient {
    /// Create a client with no address set
    pub fn new(config: RemoteConfig) -> Self {
        let chunker = Chunker::with_chunk_size(config.chunk_size);
        Self {
            manager: ConnectionManager::new(config),
            chunker,
        }
    }

    /// Set the companion host; a change while connected disconnects first
    pub async fn set_address(&self, address: Option<String>) {
        self.manager.set_endpoint(address).await;
    }

    /// Companion host
    pub async fn address(&self) -> Option<String> {
        self.manager.endpoint().await
    }

    /// Limits negotiated with the companion, while connected
    pub async fn limits(&self) -> Option<NegotiatedLimits> {
        self.manager.limits().await
    }

    /// Connection statistics
    pub async fn stats(&self) -> SessionStats {
        self.manager.stats().await
    }

    async fn read_chunk(&self, chunk: &Chunk) -> Result<OperationResult, ClientError> {
        let frame = chunk.read_frame().map_err(ClientError::Validation)?;
        single_result(self.manager.execute(&frame).await?)
    }

    async fn write_chunk(
        &self,
        chunk: &Chunk,
        data: &Bytes,
    ) -> Result<OperationResult, ClientError> {
        let frame = chunk.write_frame(data).map_err(ClientError::Validation)?;
        single_result(self.manager.execute(&frame).await?)
    }

    /// Read a span chunk by chunk; `None` as soon as one chunk is rejected
    async fn read_span(&self, target: Target, size: usize) -> Result<Option<Bytes>, ClientError> {
        let chunks = self
            .chunker
            .split(target, size)
            .map_err(ClientError::Validation)?;

        let mut reassembler = Reassembler::new(size);
        for chunk in &chunks {
            match self.read_chunk(chunk).await? {
                Some(bytes) => reassembler.push(&bytes),
                None => {
                    debug!("Read rejected at chunk starting {} of {:?}", chunk.start, target);
                    return Ok(None);
                }
            }
        }

        Ok(Some(reassembler.finish()))
    }

    /// Write a span chunk by chunk, stopping at the first rejected chunk
    async fn write_span(&self, target: Target, data: Bytes) -> Result<(), ClientError> {
        let chunks = self
            .chunker
            .split(target, data.len())
            .map_err(ClientError::Validation)?;

        for chunk in &chunks {
            if self.write_chunk(chunk, &data).await?.is_none() {
                // Remote write failures are not surfaced to callers
                debug!("Write rejected at chunk starting {} of {:?}", chunk.start, target);
                break;
            }
        }

        Ok(())
    }
}

/// Every chunk frame carries exactly one operation
fn single_result(results: Vec<OperationResult>) -> Result<OperationResult, ClientError> {
    let mut results = results.into_iter();
    match (results.next(), results.next()) {
        (Some(result), None) => Ok(result),
        _ => Err(ClientError::Protocol(WireError::Malformed(
            "expected exactly one result",
        ))),
    }
}

#[async_trait]
impl GameMemory for NetworkClient {
    async fn connect(&self) -> Result<(), BackendError> {
        self.manager.connect().await?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    async fn is_connected(&self) -> bool {
        self.manager.is_connected().await
    }

    async fn read_address(&self, address: u32, size: usize) -> Result<Bytes, BackendError> {
        self.read_span(Target::Direct(address), size)
            .await?
            .ok_or_else(|| ClientError::remote_fault(address, size).into())
    }

    async fn read_pointer(
        &self,
        pointer: u32,
        offset: u16,
        size: usize,
    ) -> Result<Option<Bytes>, BackendError> {
        Ok(self
            .read_span(Target::Indirect { pointer, offset }, size)
            .await?)
    }

    async fn write_address(&self, address: u32, data: Bytes) -> Result<(), BackendError> {
        Ok(self.write_span(Target::Direct(address), data).await?)
    }

    async fn write_pointer(
        &self,
        pointer: u32,
        offset: u16,
        data: Bytes,
    ) -> Result<(), BackendError> {
        Ok(self
            .write_span(Target::Indirect { pointer, offset }, data)
            .await?)
    }
}
