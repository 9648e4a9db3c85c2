//! Request frames for the companion protocol.
//!
//! This module provides the operation and frame structures together with
//! their big-endian encoding.
//!
//! ```text
//! +--------+---------+-----------+------+
//! | opcode | opCount | addrCount | 0x01 |
//! +--------+---------+-----------+------+
//! | u32 address * addrCount             |
//! +-------------------------------------+
//! | header | size | [u16 offset] | data | * opCount
//! +-------------------------------------+
//! ```

use crate::header::{Opcode, OperationHeader};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the fixed frame prefix
pub const FRAME_PREFIX_SIZE: usize = 4;

/// Size of one address-table entry
pub const ADDRESS_SIZE: usize = 4;

/// Largest size a single operation can declare
pub const MAX_OPERATION_SIZE: usize = u8::MAX as usize;

/// Largest operation or address count a frame can declare
pub const MAX_FRAME_ENTRIES: usize = u8::MAX as usize;

/// One memory action inside a command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Packed flags and address-table index
    pub header: OperationHeader,
    /// Byte count
    pub size: u8,
    /// Offset applied after resolving the address-table entry
    pub indirect_offset: Option<u16>,
    /// Payload (writes only)
    pub data: Option<Bytes>,
}

impl Operation {
    /// Build a read of `size` bytes
    pub fn read(
        address_index: usize,
        size: usize,
        indirect_offset: Option<u16>,
    ) -> Result<Self, crate::WireError> {
        if size > MAX_OPERATION_SIZE {
            return Err(crate::WireError::OperationSize(size));
        }
        let header = OperationHeader::new(true, false, indirect_offset.is_some(), address_index)?;

        Ok(Self {
            header,
            size: size as u8,
            indirect_offset,
            data: None,
        })
    }

    /// Build a write of `data`
    pub fn write(
        address_index: usize,
        data: Bytes,
        indirect_offset: Option<u16>,
    ) -> Result<Self, crate::WireError> {
        if data.len() > MAX_OPERATION_SIZE {
            return Err(crate::WireError::OperationSize(data.len()));
        }
        let header = OperationHeader::new(false, true, indirect_offset.is_some(), address_index)?;

        Ok(Self {
            header,
            size: data.len() as u8,
            indirect_offset,
            data: Some(data),
        })
    }

    /// Whether a successful result carries `size` payload bytes
    pub fn is_read(&self) -> bool {
        self.header.read
    }

    /// Get the encoded size of this operation
    pub fn encoded_size(&self) -> usize {
        let mut size = 2; // header + size
        if self.indirect_offset.is_some() {
            size += 2;
        }
        if let Some(ref data) = self.data {
            size += data.len();
        }
        size
    }

    /// Encode the operation (big-endian)
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.header.pack());
        buf.put_u8(self.size);
        if let Some(offset) = self.indirect_offset {
            buf.put_u16(offset);
        }
        if let Some(ref data) = self.data {
            buf.put_slice(data);
        }
    }
}

/// Complete request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Frame opcode
    pub opcode: Opcode,
    /// Address table
    pub addresses: Vec<u32>,
    /// Operations referencing the address table
    pub operations: Vec<Operation>,
}

impl RequestFrame {
    /// Build the handshake request
    pub fn version_request() -> Self {
        Self {
            opcode: Opcode::RequestVersion,
            addresses: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Build a command frame, checking every operation against the address table
    pub fn commands(
        addresses: Vec<u32>,
        operations: Vec<Operation>,
    ) -> Result<Self, crate::WireError> {
        if addresses.len() > MAX_FRAME_ENTRIES {
            return Err(crate::WireError::TooManyAddresses(addresses.len()));
        }
        if operations.len() > MAX_FRAME_ENTRIES {
            return Err(crate::WireError::TooManyOperations(operations.len()));
        }

        for op in &operations {
            let index = op.header.address_index as usize;
            if index >= addresses.len() {
                return Err(crate::WireError::AddressNotInTable {
                    index,
                    count: addresses.len(),
                });
            }
        }

        Ok(Self {
            opcode: Opcode::ReadCommands,
            addresses,
            operations,
        })
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        FRAME_PREFIX_SIZE
            + self.addresses.len() * ADDRESS_SIZE
            + self
                .operations
                .iter()
                .map(Operation::encoded_size)
                .sum::<usize>()
    }

    /// Largest response the peer may send back for this frame
    pub fn max_response_size(&self) -> usize {
        match self.opcode {
            Opcode::RequestVersion => crate::codec::HANDSHAKE_RESPONSE_SIZE,
            Opcode::ReadCommands => {
                crate::codec::success_mask_len(self.operations.len())
                    + self
                        .operations
                        .iter()
                        .filter(|op| op.is_read())
                        .map(|op| op.size as usize)
                        .sum::<usize>()
            }
        }
    }

    /// Encode frame to a contiguous buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());

        buf.put_u8(self.opcode as u8);
        buf.put_u8(self.operations.len() as u8);
        buf.put_u8(self.addresses.len() as u8);
        buf.put_u8(1);

        for address in &self.addresses {
            buf.put_u32(*address);
        }

        for op in &self.operations {
            op.encode(&mut buf);
        }

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_request_bytes() {
        let frame = RequestFrame::version_request();
        assert_eq!(&frame.encode()[..], &[1, 0, 0, 1]);
        assert_eq!(frame.max_response_size(), 16);
    }

    #[test]
    fn test_direct_read_frame() {
        let op = Operation::read(0, 6, None).unwrap();
        let frame = RequestFrame::commands(vec![0x8000_0000], vec![op]).unwrap();

        assert_eq!(
            &frame.encode()[..],
            &[0, 1, 1, 1, 0x80, 0x00, 0x00, 0x00, 0x80, 6]
        );
        assert_eq!(frame.encoded_size(), 10);
        assert_eq!(frame.max_response_size(), 1 + 6);
    }

    #[test]
    fn test_indirect_write_frame() {
        let op = Operation::write(0, Bytes::from_static(&[0xAA, 0xBB]), Some(0x0104)).unwrap();
        let frame = RequestFrame::commands(vec![0x8123_4560], vec![op]).unwrap();

        assert_eq!(
            &frame.encode()[..],
            &[0, 1, 1, 1, 0x81, 0x23, 0x45, 0x60, 0x50, 2, 0x01, 0x04, 0xAA, 0xBB]
        );
        // Writes never contribute payload to the response
        assert_eq!(frame.max_response_size(), 1);
    }

    #[test]
    fn test_zero_size_read() {
        let op = Operation::read(0, 0, None).unwrap();
        let frame = RequestFrame::commands(vec![0], vec![op]).unwrap();
        assert_eq!(&frame.encode()[8..], &[0x80, 0]);
    }

    #[test]
    fn test_operation_size_limit() {
        assert!(Operation::read(0, 255, None).is_ok());
        assert_eq!(
            Operation::read(0, 256, None),
            Err(crate::WireError::OperationSize(256))
        );
        assert_eq!(
            Operation::write(0, Bytes::from(vec![0u8; 300]), None),
            Err(crate::WireError::OperationSize(300))
        );
    }

    #[test]
    fn test_index_must_be_in_table() {
        let op = Operation::read(1, 4, None).unwrap();
        assert_eq!(
            RequestFrame::commands(vec![0x8000_0000], vec![op]),
            Err(crate::WireError::AddressNotInTable { index: 1, count: 1 })
        );
    }
}
