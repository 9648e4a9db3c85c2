//! Opcodes and the packed one-byte operation header.
//!
//! Every memory operation in a command frame starts with a single header
//! byte. The high nibble carries the operation flags, the low nibble the
//! index into the frame's address table:
//!
//! ```text
//!   7     6     5     4     3..0
//! +-----+-----+-----+-----+---------------+
//! | RD  | WR  | WRD | OFS | address index |
//! +-----+-----+-----+-----+---------------+
//! ```

/// TCP port the companion process listens on
pub const DEFAULT_PORT: u16 = 43673;

/// Header flag: operation reads memory
pub const READ_FLAG: u8 = 0x80;
/// Header flag: operation writes memory
pub const WRITE_FLAG: u8 = 0x40;
/// Header flag: word mode (reserved, never set by this client)
pub const WORD_FLAG: u8 = 0x20;
/// Header flag: a 16-bit indirect offset follows the size byte
pub const OFFSET_FLAG: u8 = 0x10;
/// Mask selecting the address-table index
pub const ADDRESS_INDEX_MASK: u8 = 0x0F;

/// Request opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Batch of read/write operations
    ReadCommands = 0,
    /// Version and capacity handshake
    RequestVersion = 1,
}

impl TryFrom<u8> for Opcode {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::ReadCommands),
            1 => Ok(Opcode::RequestVersion),
            _ => Err(crate::WireError::Opcode(value)),
        }
    }
}

/// Unpacked operation header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationHeader {
    /// Read flag
    pub read: bool,
    /// Write flag
    pub write: bool,
    /// Word-mode flag (reserved)
    pub word: bool,
    /// Indirect offset present
    pub indirect: bool,
    /// Index into the frame's address table (0..=15)
    pub address_index: u8,
}

impl OperationHeader {
    /// Build a header, rejecting address indices that do not fit in 4 bits
    pub fn new(
        read: bool,
        write: bool,
        indirect: bool,
        address_index: usize,
    ) -> Result<Self, crate::WireError> {
        if address_index > ADDRESS_INDEX_MASK as usize {
            return Err(crate::WireError::AddressIndex(address_index));
        }

        Ok(Self {
            read,
            write,
            word: false,
            indirect,
            address_index: address_index as u8,
        })
    }

    /// Pack into the on-wire byte
    pub fn pack(self) -> u8 {
        let mut byte = self.address_index & ADDRESS_INDEX_MASK;
        if self.read {
            byte |= READ_FLAG;
        }
        if self.write {
            byte |= WRITE_FLAG;
        }
        if self.word {
            byte |= WORD_FLAG;
        }
        if self.indirect {
            byte |= OFFSET_FLAG;
        }
        byte
    }

    /// Unpack from the on-wire byte
    pub fn unpack(byte: u8) -> Self {
        Self {
            read: byte & READ_FLAG != 0,
            write: byte & WRITE_FLAG != 0,
            word: byte & WORD_FLAG != 0,
            indirect: byte & OFFSET_FLAG != 0,
            address_index: byte & ADDRESS_INDEX_MASK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_conversion() {
        assert_eq!(Opcode::try_from(0).unwrap(), Opcode::ReadCommands);
        assert_eq!(Opcode::try_from(1).unwrap(), Opcode::RequestVersion);
        assert!(Opcode::try_from(2).is_err());
    }

    #[test]
    fn test_header_packing() {
        let read = OperationHeader::new(true, false, false, 0).unwrap();
        assert_eq!(read.pack(), 0x80);

        let indirect_write = OperationHeader::new(false, true, true, 3).unwrap();
        assert_eq!(indirect_write.pack(), 0x53);

        let max_index = OperationHeader::new(true, false, true, 15).unwrap();
        assert_eq!(max_index.pack(), 0x9F);
    }

    #[test]
    fn test_header_rejects_large_index() {
        assert_eq!(
            OperationHeader::new(true, false, false, 16),
            Err(crate::WireError::AddressIndex(16))
        );
    }

    #[test]
    fn test_word_flag_is_representable() {
        let header = OperationHeader::unpack(0xA2);
        assert!(header.read);
        assert!(header.word);
        assert!(!header.write);
        assert_eq!(header.address_index, 2);
        assert_eq!(header.pack(), 0xA2);
    }
}
