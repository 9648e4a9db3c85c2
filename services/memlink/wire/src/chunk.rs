//! Splitting memory spans into bounded operations.
//!
//! A single operation declares its size in one byte, so spans are cut into
//! consecutive chunks of at most `chunk_size` bytes. Each chunk becomes its
//! own request frame; results are stitched back together in order.

use crate::frame::{Operation, RequestFrame, MAX_OPERATION_SIZE};
use bytes::{Bytes, BytesMut};

/// Default chunk size (well under the smallest input limit seen in practice)
pub const DEFAULT_CHUNK_SIZE: usize = 80;

/// Where a span starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Flat address
    Direct(u32),
    /// Pointer dereferenced once by the peer, then offset
    Indirect {
        /// Address holding the pointer
        pointer: u32,
        /// Offset applied after dereferencing
        offset: u16,
    },
}

/// One bounded piece of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Address-table entry for this chunk
    pub address: u32,
    /// Indirect offset for this chunk
    pub indirect_offset: Option<u16>,
    /// Start of the chunk within the span
    pub start: usize,
    /// Length of the chunk
    pub len: usize,
}

impl Chunk {
    /// Build the frame reading this chunk
    pub fn read_frame(&self) -> Result<RequestFrame, crate::WireError> {
        let op = Operation::read(0, self.len, self.indirect_offset)?;
        RequestFrame::commands(vec![self.address], vec![op])
    }

    /// Build the frame writing this chunk's slice of `data`
    pub fn write_frame(&self, data: &Bytes) -> Result<RequestFrame, crate::WireError> {
        let slice = data.slice(self.start..self.start + self.len);
        let op = Operation::write(0, slice, self.indirect_offset)?;
        RequestFrame::commands(vec![self.address], vec![op])
    }
}

/// Reject spans that run past the 32-bit address space or the 16-bit offset
fn check_span(target: Target, len: usize) -> Result<(), crate::WireError> {
    match target {
        Target::Direct(address) => {
            let end = (address as u64).checked_add(len as u64);
            if end.map_or(true, |end| end > 1 << 32) {
                return Err(crate::WireError::AddressOverflow { address, len });
            }
        }
        Target::Indirect { offset, .. } => {
            let end = (offset as usize).checked_add(len);
            if end.map_or(true, |end| end > 1 << 16) {
                return Err(crate::WireError::IndirectOffset(end.unwrap_or(usize::MAX)));
            }
        }
    }
    Ok(())
}

/// Chunker for splitting spans into operations
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
}

impl Chunker {
    /// Create a new chunker with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a chunker with a custom chunk size, clamped to `1..=255`
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_OPERATION_SIZE),
        }
    }

    /// Chunk size in use
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split a span of `len` bytes at `target`
    ///
    /// A zero-length span still yields one zero-length chunk so the peer
    /// validates the target.
    pub fn split(&self, target: Target, len: usize) -> Result<Vec<Chunk>, crate::WireError> {
        check_span(target, len)?;
        if len == 0 {
            return Ok(vec![self.chunk_at(target, 0, 0)?]);
        }

        let total_chunks = len.div_ceil(self.chunk_size);
        let mut chunks = Vec::with_capacity(total_chunks);
        let mut start = 0;

        while start < len {
            let chunk_len = std::cmp::min(self.chunk_size, len - start);
            chunks.push(self.chunk_at(target, start, chunk_len)?);
            start += chunk_len;
        }

        Ok(chunks)
    }

    fn chunk_at(
        &self,
        target: Target,
        start: usize,
        len: usize,
    ) -> Result<Chunk, crate::WireError> {
        match target {
            Target::Direct(address) => {
                let overflow = crate::WireError::AddressOverflow {
                    address,
                    len: start + len,
                };
                let start_u32 = u32::try_from(start).map_err(|_| overflow.clone())?;
                let chunk_address = address.checked_add(start_u32).ok_or(overflow.clone())?;
                // The last byte of the chunk must be addressable too
                if len > 0 {
                    chunk_address
                        .checked_add(len as u32 - 1)
                        .ok_or(overflow)?;
                }
                Ok(Chunk {
                    address: chunk_address,
                    indirect_offset: None,
                    start,
                    len,
                })
            }
            Target::Indirect { pointer, offset } => {
                let chunk_offset = offset as usize + start;
                let chunk_offset = u16::try_from(chunk_offset)
                    .map_err(|_| crate::WireError::IndirectOffset(chunk_offset))?;
                Ok(Chunk {
                    address: pointer,
                    indirect_offset: Some(chunk_offset),
                    start,
                    len,
                })
            }
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Reassembler for collecting chunk results into one span
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
}

impl Reassembler {
    /// Create a reassembler for a span of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(len),
        }
    }

    /// Append the next chunk's bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Complete span
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_span() {
        let chunks = Chunker::new().split(Target::Direct(0x8000_0000), 0).unwrap();
        assert_eq!(
            chunks,
            vec![Chunk {
                address: 0x8000_0000,
                indirect_offset: None,
                start: 0,
                len: 0,
            }]
        );
    }

    #[test]
    fn test_direct_span_boundaries() {
        let chunker = Chunker::new();

        let exact = chunker.split(Target::Direct(0x8000_0000), 80).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].len, 80);

        let over = chunker.split(Target::Direct(0x8000_0000), 81).unwrap();
        assert_eq!(over.len(), 2);
        assert_eq!((over[0].address, over[0].len), (0x8000_0000, 80));
        assert_eq!((over[1].address, over[1].len), (0x8000_0050, 1));
        assert_eq!(over[1].start, 80);
    }

    #[test]
    fn test_indirect_span_offsets() {
        let chunks = Chunker::new()
            .split(
                Target::Indirect {
                    pointer: 0x803C_0000,
                    offset: 4,
                },
                200,
            )
            .unwrap();

        let layout: Vec<(Option<u16>, usize)> =
            chunks.iter().map(|c| (c.indirect_offset, c.len)).collect();
        assert_eq!(layout, vec![(Some(4), 80), (Some(84), 80), (Some(164), 40)]);
        assert!(chunks.iter().all(|c| c.address == 0x803C_0000));
    }

    #[test]
    fn test_indirect_offset_overflow() {
        let result = Chunker::new().split(
            Target::Indirect {
                pointer: 0,
                offset: 0xFFF0,
            },
            100,
        );
        assert!(matches!(result, Err(crate::WireError::IndirectOffset(_))));
    }

    #[test]
    fn test_direct_address_overflow() {
        let result = Chunker::new().split(Target::Direct(0xFFFF_FFF0), 32);
        assert!(matches!(
            result,
            Err(crate::WireError::AddressOverflow { .. })
        ));
    }

    #[test]
    fn test_oversized_spans_rejected_up_front() {
        let chunker = Chunker::new();
        assert!(matches!(
            chunker.split(Target::Direct(0x8000_0000), 1 << 40),
            Err(crate::WireError::AddressOverflow { .. })
        ));
        assert!(matches!(
            chunker.split(Target::Direct(0x8000_0000), usize::MAX),
            Err(crate::WireError::AddressOverflow { .. })
        ));
        let indirect = Target::Indirect {
            pointer: 0x8000_0000,
            offset: 0,
        };
        assert!(matches!(
            chunker.split(indirect, usize::MAX),
            Err(crate::WireError::IndirectOffset(_))
        ));
    }

    #[test]
    fn test_span_up_to_end_of_range() {
        let chunker = Chunker::with_chunk_size(16);

        let chunks = chunker.split(Target::Direct(0xFFFF_FFF0), 16).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunker.split(Target::Direct(0xFFFF_FFF0), 17).is_err());

        let indirect = Target::Indirect {
            pointer: 0,
            offset: 0xFFF0,
        };
        assert_eq!(chunker.split(indirect, 16).unwrap().len(), 1);
        assert!(chunker.split(indirect, 17).is_err());
    }

    #[test]
    fn test_write_frame_slices_data() {
        let data = Bytes::from((0u8..100).collect::<Vec<_>>());
        let chunks = Chunker::new().split(Target::Direct(0x8100_0000), data.len()).unwrap();

        let second = chunks[1].write_frame(&data).unwrap();
        assert_eq!(second.addresses, vec![0x8100_0050]);
        assert_eq!(
            second.operations[0].data.as_deref(),
            Some(&(80u8..100).collect::<Vec<_>>()[..])
        );
    }

    #[test]
    fn test_chunk_size_clamped() {
        assert_eq!(Chunker::with_chunk_size(0).chunk_size(), 1);
        assert_eq!(Chunker::with_chunk_size(1000).chunk_size(), 255);
    }

    #[test]
    fn test_reassembly_in_order() {
        let mut reassembler = Reassembler::new(5);
        reassembler.push(&[1, 2]);
        reassembler.push(&[3, 4, 5]);
        assert_eq!(&reassembler.finish()[..], &[1, 2, 3, 4, 5]);
    }
}
