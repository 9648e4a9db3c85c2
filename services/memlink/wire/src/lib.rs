//! Wire protocol framing, packed operation headers, response decoding, and
//! chunking for memlink.
//!
//! This crate provides the byte-level side of the companion protocol used to
//! read and write console memory over TCP. It performs no I/O.
//!
//! ## Wire Format
//!
//! Requests (big-endian throughout):
//!
//! ```text
//! +--------+---------+-----------+------+
//! | opcode | opCount | addrCount | 0x01 |
//! +--------+---------+-----------+------+
//! | u32 address table                   |
//! +-------------------------------------+
//! | operations (header, size, ...)      |
//! +-------------------------------------+
//! ```
//!
//! Responses to `READ_COMMANDS`:
//!
//! ```text
//! +---------------------------+-------------------------------+
//! | ceil(opCount / 8) bitmask | successful read payloads      |
//! +---------------------------+-------------------------------+
//! ```
//!
//! Responses to `REQUEST_VERSION` are four u32 words: protocol version,
//! max input bytes, max output bytes, max addresses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod codec;
pub mod error;
pub mod frame;
pub mod header;

// Re-export main types
pub use chunk::{Chunk, Chunker, Reassembler, Target, DEFAULT_CHUNK_SIZE};
pub use codec::{
    decode_results, is_success, success_mask_len, NegotiatedLimits, OperationResult, Response,
    ResponseDecoder, HANDSHAKE_RESPONSE_SIZE, MIN_COMMAND_FRAME_SIZE,
};
pub use error::WireError;
pub use frame::{
    Operation, RequestFrame, ADDRESS_SIZE, FRAME_PREFIX_SIZE, MAX_FRAME_ENTRIES,
    MAX_OPERATION_SIZE,
};
pub use header::{
    Opcode, OperationHeader, ADDRESS_INDEX_MASK, DEFAULT_PORT, OFFSET_FLAG, READ_FLAG, WORD_FLAG,
    WRITE_FLAG,
};
