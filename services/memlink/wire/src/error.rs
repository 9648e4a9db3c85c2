//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
///
/// Everything in here is raised locally: either while building a request
/// (validation) or while decoding a response (protocol violation).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Address-table index does not fit in the 4-bit header field
    #[error("address index too large: max 15, got {0}")]
    AddressIndex(usize),

    /// Operation references an address-table entry that the frame does not carry
    #[error("address index {index} out of range for table of {count} addresses")]
    AddressNotInTable {
        /// Index carried by the operation header
        index: usize,
        /// Number of addresses in the frame
        count: usize,
    },

    /// Operation size does not fit in one byte
    #[error("operation size too large: max 255, got {0}")]
    OperationSize(usize),

    /// Indirect offset does not fit in 16 bits
    #[error("indirect offset out of range: {0:#x}")]
    IndirectOffset(usize),

    /// Span end wraps the 32-bit address space
    #[error("address range overflow: {address:#x} + {len}")]
    AddressOverflow {
        /// Base address of the span
        address: u32,
        /// Length of the span in bytes
        len: usize,
    },

    /// More operations than the one-byte count field can carry
    #[error("too many operations: max 255, got {0}")]
    TooManyOperations(usize),

    /// More addresses than the one-byte count field can carry
    #[error("too many addresses: max 255, got {0}")]
    TooManyAddresses(usize),

    /// Response ended before every declared byte was consumed
    #[error("short response: expected {expected} bytes, got {actual}")]
    Short {
        /// Bytes the request declared
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Response carried bytes beyond what the request declared
    #[error("trailing bytes in response: expected {expected} bytes, got {actual}")]
    Trailing {
        /// Bytes the request declared
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Unknown request opcode
    #[error("unknown opcode {0}")]
    Opcode(u8),

    /// Response content is structurally invalid
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}
