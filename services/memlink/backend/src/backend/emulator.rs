//! Emulator-attached backend over external hook primitives.
//!
//! The hook library attaches to a running emulator and exposes synchronous
//! byte access. It does not notice a closed game on its own, so every call
//! first probes the game ID address and detaches when that fails.

use crate::{BackendError, GameMemory, HookError, GC_GAME_ID_ADDRESS, MAIN_RAM_END, MAIN_RAM_START};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Primitives exposed by an emulator memory hook
pub trait MemoryHook: Send {
    /// Try to attach to a running emulator
    fn hook(&mut self);

    /// Detach
    fn unhook(&mut self);

    /// Whether attached
    fn is_hooked(&self) -> bool;

    /// Read `len` bytes at `address`
    fn read_bytes(&mut self, address: u32, len: usize) -> Result<Vec<u8>, HookError>;

    /// Write `data` at `address`
    fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<(), HookError>;

    /// Dereference the pointer stored at `pointer`
    fn follow_pointer(&mut self, pointer: u32) -> Result<u32, HookError>;
}

/// Check that `[address, address + len)` lies in main RAM
fn verify_target_address(address: u32, len: usize) -> Result<(), BackendError> {
    let end = (address as u64).saturating_add(len as u64);
    if address < MAIN_RAM_START || end > MAIN_RAM_END as u64 {
        return Err(BackendError::InvalidRange { address, end });
    }
    Ok(())
}

/// Client for memory of a game running under emulation
pub struct EmulatorClient<H: MemoryHook> {
    hook: Mutex<H>,
}

impl<H: MemoryHook> EmulatorClient<H> {
    /// Wrap a hook
    pub fn new(hook: H) -> Self {
        Self {
            hook: Mutex::new(hook),
        }
    }

    /// Consume the client, returning the hook
    pub fn into_inner(self) -> H {
        self.hook.into_inner()
    }
}

fn assert_connected<H: MemoryHook>(hook: &mut H) -> Result<(), BackendError> {
    if !hook.is_hooked() {
        return Err(BackendError::Emulator("not hooked".to_string()));
    }
    if let Err(e) = hook.read_bytes(GC_GAME_ID_ADDRESS, 1) {
        hook.unhook();
        info!("Emulator connection lost: {}", e);
        return Err(BackendError::Emulator(e.to_string()));
    }
    Ok(())
}

fn resolve_pointer<H: MemoryHook>(
    hook: &mut H,
    pointer: u32,
    offset: u16,
) -> Result<Option<u32>, BackendError> {
    let address = match hook.follow_pointer(pointer) {
        Ok(address) => address,
        Err(e) => {
            debug!("Could not follow pointer {:#x}: {}", pointer, e);
            return Ok(None);
        }
    };

    if !hook.is_hooked() {
        return Err(BackendError::Emulator("emulator no longer connected".to_string()));
    }

    Ok(Some(address.wrapping_add(offset as u32)))
}

fn read_checked<H: MemoryHook>(
    hook: &mut H,
    address: u32,
    size: usize,
) -> Result<Bytes, BackendError> {
    verify_target_address(address, size)?;
    Ok(Bytes::from(hook.read_bytes(address, size)?))
}

#[async_trait]
impl<H: MemoryHook + 'static> GameMemory for EmulatorClient<H> {
    async fn connect(&self) -> Result<(), BackendError> {
        let mut hook = self.hook.lock().await;
        if !hook.is_hooked() {
            hook.hook();
        }
        if !hook.is_hooked() {
            return Err(BackendError::Emulator(
                "could not connect, verify that you have a game running in the emulator"
                    .to_string(),
            ));
        }
        info!("Hooked into emulator");
        Ok(())
    }

    async fn disconnect(&self) {
        let mut hook = self.hook.lock().await;
        if hook.is_hooked() {
            hook.unhook();
        }
    }

    async fn is_connected(&self) -> bool {
        let mut hook = self.hook.lock().await;
        assert_connected(&mut *hook).is_ok()
    }

    async fn read_address(&self, address: u32, size: usize) -> Result<Bytes, BackendError> {
        let mut hook = self.hook.lock().await;
        assert_connected(&mut *hook)?;
        read_checked(&mut *hook, address, size)
    }

    async fn read_pointer(
        &self,
        pointer: u32,
        offset: u16,
        size: usize,
    ) -> Result<Option<Bytes>, BackendError> {
        let mut hook = self.hook.lock().await;
        assert_connected(&mut *hook)?;
        match resolve_pointer(&mut *hook, pointer, offset)? {
            Some(address) => Ok(Some(read_checked(&mut *hook, address, size)?)),
            None => Ok(None),
        }
    }

    async fn write_address(&self, address: u32, data: Bytes) -> Result<(), BackendError> {
        let mut hook = self.hook.lock().await;
        assert_connected(&mut *hook)?;
        hook.write_bytes(address, &data)?;
        Ok(())
    }

    async fn write_pointer(
        &self,
        pointer: u32,
        offset: u16,
        data: Bytes,
    ) -> Result<(), BackendError> {
        let mut hook = self.hook.lock().await;
        assert_connected(&mut *hook)?;
        if let Some(address) = resolve_pointer(&mut *hook, pointer, offset)? {
            hook.write_bytes(address, &data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryImage;

    fn running_game() -> EmulatorClient<MemoryImage> {
        let mut image = MemoryImage::new(0x1000);
        image.poke(GC_GAME_ID_ADDRESS, b"GZ2E01");
        EmulatorClient::new(image)
    }

    #[test]
    fn test_verify_target_address() {
        assert!(verify_target_address(0x8000_0000, 4).is_ok());
        assert!(verify_target_address(0x817F_FFFC, 4).is_ok());
        assert!(verify_target_address(0x817F_FFFD, 4).is_err());
        assert!(verify_target_address(0x7FFF_FFFF, 1).is_err());
        assert!(verify_target_address(0x8000_0000, usize::MAX).is_err());
    }

    #[tokio::test]
    async fn test_connect_and_read() {
        let client = running_game();
        assert!(!client.is_connected().await);

        client.connect().await.unwrap();
        assert!(client.is_connected().await);
        assert_eq!(
            &client.read_address(0x8000_0000, 6).await.unwrap()[..],
            b"GZ2E01"
        );
    }

    #[tokio::test]
    async fn test_connect_without_game() {
        let mut image = MemoryImage::new(0x100);
        image.set_game_running(false);
        let client = EmulatorClient::new(image);

        assert!(matches!(
            client.connect().await,
            Err(BackendError::Emulator(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_game_detaches() {
        let client = running_game();
        client.connect().await.unwrap();

        client.hook.lock().await.set_game_running(false);
        assert!(matches!(
            client.read_address(0x8000_0000, 1).await,
            Err(BackendError::Emulator(_))
        ));
        assert!(!client.into_inner().is_hooked());
    }

    #[tokio::test]
    async fn test_read_outside_main_ram() {
        let client = running_game();
        client.connect().await.unwrap();
        assert!(matches!(
            client.read_address(0x7000_0000, 4).await,
            Err(BackendError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_pointer_access() {
        let mut image = MemoryImage::new(0x1000);
        image.poke(0x8000_0100, &0x8000_0200u32.to_be_bytes());
        image.poke(0x8000_0204, &[1, 2, 3, 4]);
        // Points outside the image
        image.poke(0x8000_0110, &0x9000_0000u32.to_be_bytes());
        let client = EmulatorClient::new(image);
        client.connect().await.unwrap();

        let value = client.read_pointer(0x8000_0100, 4, 4).await.unwrap();
        assert_eq!(value.as_deref(), Some(&[1u8, 2, 3, 4][..]));

        assert_eq!(client.read_pointer(0x8000_0110, 0, 4).await.unwrap(), None);

        client
            .write_pointer(0x8000_0100, 8, Bytes::from_static(&[9, 9]))
            .await
            .unwrap();
        assert_eq!(
            &client.read_address(0x8000_0208, 2).await.unwrap()[..],
            &[9, 9]
        );

        // Unresolvable pointer writes are dropped
        client
            .write_pointer(0x8000_0110, 0, Bytes::from_static(&[1]))
            .await
            .unwrap();
    }
}
