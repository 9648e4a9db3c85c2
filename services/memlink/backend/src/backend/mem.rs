//! In-memory hook for development and testing

use crate::backend::emulator::MemoryHook;
use crate::{HookError, MAIN_RAM_START};
use tracing::debug;

/// Flat byte image of main RAM behind a [`MemoryHook`]
#[derive(Debug, Clone)]
pub struct MemoryImage {
    bytes: Vec<u8>,
    hooked: bool,
    game_running: bool,
}

impl MemoryImage {
    /// Create a zeroed image of `len` bytes starting at main RAM
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
            hooked: false,
            game_running: true,
        }
    }

    /// Create a zeroed image covering all of main RAM
    pub fn main_ram() -> Self {
        Self::new((crate::MAIN_RAM_END - MAIN_RAM_START) as usize)
    }

    /// Simulate the game starting or closing
    pub fn set_game_running(&mut self, running: bool) {
        self.game_running = running;
    }

    /// Write bytes directly, bypassing the hook state
    ///
    /// Panics if the span is outside the image.
    pub fn poke(&mut self, address: u32, data: &[u8]) {
        let start = (address - MAIN_RAM_START) as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    /// Read bytes directly, bypassing the hook state
    ///
    /// Panics if the span is outside the image.
    pub fn peek(&self, address: u32, len: usize) -> &[u8] {
        let start = (address - MAIN_RAM_START) as usize;
        &self.bytes[start..start + len]
    }

    fn range(&self, address: u32, len: usize) -> Result<std::ops::Range<usize>, HookError> {
        if !self.hooked || !self.game_running {
            return Err(HookError::NotHooked);
        }
        let start = address
            .checked_sub(MAIN_RAM_START)
            .ok_or(HookError::Inaccessible(address))? as usize;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(HookError::Inaccessible(address))?;
        Ok(start..end)
    }
}

impl MemoryHook for MemoryImage {
    fn hook(&mut self) {
        if self.game_running {
            self.hooked = true;
        }
    }

    fn unhook(&mut self) {
        self.hooked = false;
    }

    fn is_hooked(&self) -> bool {
        self.hooked
    }

    fn read_bytes(&mut self, address: u32, len: usize) -> Result<Vec<u8>, HookError> {
        let range = self.range(address, len)?;
        Ok(self.bytes[range].to_vec())
    }

    fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<(), HookError> {
        let range = self.range(address, data.len())?;
        debug!("Image write {:#x} len={}", address, data.len());
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn follow_pointer(&mut self, pointer: u32) -> Result<u32, HookError> {
        let range = self.range(pointer, 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[range]);
        let target = u32::from_be_bytes(word);

        // The dereferenced address has to be inside the image as well
        self.range(target, 0)?;
        Ok(target)
    }
}
