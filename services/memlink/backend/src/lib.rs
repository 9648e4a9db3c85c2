//! Game memory access with pluggable backends.
//!
//! This crate provides the capability interface a game-state tracker uses to
//! read and write console memory, and the backends that implement it: a
//! network-attached client speaking the companion protocol, and an
//! emulator-attached client driving external hook primitives.
//!
//! Callers hold a `dyn GameMemory` (or a [`BackendSlot`]) and never see which
//! backend is active.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

use async_trait::async_trait;
use bytes::Bytes;
use memlink_session::ClientError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Address of the disc ID at the start of main RAM
pub const GC_GAME_ID_ADDRESS: u32 = 0x8000_0000;

/// Length of the disc ID
pub const GAME_ID_LEN: usize = 6;

/// First address of main RAM
pub const MAIN_RAM_START: u32 = 0x8000_0000;

/// One past the last address of main RAM
pub const MAIN_RAM_END: u32 = 0x8180_0000;

/// Errors reported by external hook primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The hook is not attached to a running game
    #[error("not hooked")]
    NotHooked,
    /// Memory at the address cannot be accessed
    #[error("address {0:#x} is not accessible")]
    Inaccessible(u32),
}

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network-attached client error
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Emulator not attached or lost
    #[error("emulator connection error: {0}")]
    Emulator(String),

    /// Span outside main RAM
    #[error("{address:x} -> {end:x} is not valid for GC memory")]
    InvalidRange {
        /// Start of the span
        address: u32,
        /// End of the span (exclusive)
        end: u64,
    },

    /// Hook primitive failure
    #[error("hook error: {0}")]
    Hook(#[from] HookError),
}

/// Capability interface shared by every backend
#[async_trait]
pub trait GameMemory: Send + Sync {
    /// Attach to the game
    async fn connect(&self) -> Result<(), BackendError>;

    /// Detach; always succeeds and may be repeated
    async fn disconnect(&self);

    /// Whether memory calls can currently succeed
    async fn is_connected(&self) -> bool;

    /// Read `size` bytes at `address`; an unreadable span is an error
    async fn read_address(&self, address: u32, size: usize) -> Result<Bytes, BackendError>;

    /// Read `size` bytes at `*pointer + offset`; an unreadable span is `None`
    async fn read_pointer(
        &self,
        pointer: u32,
        offset: u16,
        size: usize,
    ) -> Result<Option<Bytes>, BackendError>;

    /// Write `data` at `address`; remote rejection is not reported
    async fn write_address(&self, address: u32, data: Bytes) -> Result<(), BackendError>;

    /// Write `data` at `*pointer + offset`; remote rejection is not reported
    async fn write_pointer(&self, pointer: u32, offset: u16, data: Bytes)
        -> Result<(), BackendError>;
}

/// Read the disc ID of the running game
pub async fn read_game_id(memory: &dyn GameMemory) -> Result<String, BackendError> {
    let bytes = memory.read_address(GC_GAME_ID_ADDRESS, GAME_ID_LEN).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Holder for the active backend, swappable at runtime
pub struct BackendSlot {
    current: RwLock<Arc<dyn GameMemory>>,
}

impl BackendSlot {
    /// Create a slot holding `backend`
    pub fn new(backend: Arc<dyn GameMemory>) -> Self {
        Self {
            current: RwLock::new(backend),
        }
    }

    /// Active backend
    pub async fn current(&self) -> Arc<dyn GameMemory> {
        self.current.read().await.clone()
    }

    /// Install `backend`, disconnecting and returning the previous one
    pub async fn replace(&self, backend: Arc<dyn GameMemory>) -> Arc<dyn GameMemory> {
        let mut current = self.current.write().await;
        let previous = std::mem::replace(&mut *current, backend);
        previous.disconnect().await;
        info!("Memory backend replaced");
        previous
    }
}

#[async_trait]
impl GameMemory for BackendSlot {
    async fn connect(&self) -> Result<(), BackendError> {
        self.current().await.connect().await
    }

    async fn disconnect(&self) {
        self.current().await.disconnect().await
    }

    async fn is_connected(&self) -> bool {
        self.current().await.is_connected().await
    }

    async fn read_address(&self, address: u32, size: usize) -> Result<Bytes, BackendError> {
        self.current().await.read_address(address, size).await
    }

    async fn read_pointer(
        &self,
        pointer: u32,
        offset: u16,
        size: usize,
    ) -> Result<Option<Bytes>, BackendError> {
        self.current().await.read_pointer(pointer, offset, size).await
    }

    async fn write_address(&self, address: u32, data: Bytes) -> Result<(), BackendError> {
        self.current().await.write_address(address, data).await
    }

    async fn write_pointer(
        &self,
        pointer: u32,
        offset: u16,
        data: Bytes,
    ) -> Result<(), BackendError> {
        self.current().await.write_pointer(pointer, offset, data).await
    }
}

// Re-export backend implementations
pub use backend::emulator::{EmulatorClient, MemoryHook};
pub use backend::mem::MemoryImage;
pub use backend::network::NetworkClient;
