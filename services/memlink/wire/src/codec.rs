//! Response decoding for the companion protocol.
//!
//! Responses carry no length prefix. Their size follows from the request
//! that produced them, so the decoder is built from that request and told
//! when enough bytes have arrived.

use crate::frame::{Operation, RequestFrame, ADDRESS_SIZE, FRAME_PREFIX_SIZE};
use crate::header::Opcode;
use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

/// Handshake response size: four big-endian u32 words
pub const HANDSHAKE_RESPONSE_SIZE: usize = 16;

/// Smallest command frame: prefix, one address, one operation header and size
pub const MIN_COMMAND_FRAME_SIZE: usize = FRAME_PREFIX_SIZE + ADDRESS_SIZE + 2;

/// Capacity limits reported by the peer during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedLimits {
    /// Protocol version
    pub protocol_version: u32,
    /// Largest request frame the peer accepts
    pub max_input_bytes: u32,
    /// Largest response the peer produces
    pub max_output_bytes: u32,
    /// Largest address table the peer accepts
    pub max_addresses: u32,
}

impl NegotiatedLimits {
    /// Decode the handshake response
    pub fn decode(response: &[u8]) -> Result<Self, crate::WireError> {
        if response.len() < HANDSHAKE_RESPONSE_SIZE {
            return Err(crate::WireError::Short {
                expected: HANDSHAKE_RESPONSE_SIZE,
                actual: response.len(),
            });
        }
        if response.len() > HANDSHAKE_RESPONSE_SIZE {
            return Err(crate::WireError::Trailing {
                expected: HANDSHAKE_RESPONSE_SIZE,
                actual: response.len(),
            });
        }

        let mut buf = response;
        Ok(Self {
            protocol_version: buf.get_u32(),
            max_input_bytes: buf.get_u32(),
            max_output_bytes: buf.get_u32(),
            max_addresses: buf.get_u32(),
        })
    }

    /// Reject limits under which no command frame could ever be sent
    pub fn validate(&self) -> Result<(), crate::WireError> {
        if self.protocol_version == 0 {
            return Err(crate::WireError::Malformed("protocol version 0"));
        }
        if (self.max_input_bytes as usize) < MIN_COMMAND_FRAME_SIZE {
            return Err(crate::WireError::Malformed("max input bytes below one command"));
        }
        if self.max_addresses == 0 {
            return Err(crate::WireError::Malformed("max addresses is 0"));
        }
        Ok(())
    }
}

/// Number of bitmask bytes covering `op_count` operations
pub fn success_mask_len(op_count: usize) -> usize {
    (op_count + 7) / 8
}

/// Whether bit `index` is set in the success bitmask
pub fn is_success(mask: &[u8], index: usize) -> bool {
    mask.get(index / 8)
        .map(|byte| byte & (1 << (index % 8)) != 0)
        .unwrap_or(false)
}

/// Per-operation outcome: payload for reads, empty for writes, `None` when
/// the peer reported the operation unsuccessful
pub type OperationResult = Option<Bytes>;

/// What an operation contributes to the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OperationShape {
    read: bool,
    size: usize,
}

impl From<&Operation> for OperationShape {
    fn from(op: &Operation) -> Self {
        Self {
            read: op.is_read(),
            size: op.size as usize,
        }
    }
}

fn expected_results_len(shapes: &[OperationShape], mask: &[u8]) -> usize {
    mask.len()
        + shapes
            .iter()
            .enumerate()
            .filter(|(i, shape)| shape.read && is_success(mask, *i))
            .map(|(_, shape)| shape.size)
            .sum::<usize>()
}

fn walk_results(
    shapes: &[OperationShape],
    response: Bytes,
) -> Result<Vec<OperationResult>, crate::WireError> {
    let mask_len = success_mask_len(shapes.len());
    if response.len() < mask_len {
        return Err(crate::WireError::Short {
            expected: mask_len,
            actual: response.len(),
        });
    }

    let expected = expected_results_len(shapes, &response[..mask_len]);
    if response.len() < expected {
        return Err(crate::WireError::Short {
            expected,
            actual: response.len(),
        });
    }
    if response.len() > expected {
        return Err(crate::WireError::Trailing {
            expected,
            actual: response.len(),
        });
    }

    let mut results = Vec::with_capacity(shapes.len());
    let mut cursor = mask_len;
    for (i, shape) in shapes.iter().enumerate() {
        if !is_success(&response[..mask_len], i) {
            results.push(None);
        } else if shape.read {
            results.push(Some(response.slice(cursor..cursor + shape.size)));
            cursor += shape.size;
        } else {
            results.push(Some(Bytes::new()));
        }
    }

    debug_assert_eq!(cursor, response.len());
    Ok(results)
}

/// Decode a command response into one result per operation, in order
pub fn decode_results(
    operations: &[Operation],
    response: Bytes,
) -> Result<Vec<OperationResult>, crate::WireError> {
    let shapes: Vec<OperationShape> = operations.iter().map(OperationShape::from).collect();
    walk_results(&shapes, response)
}

/// Decoded response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Handshake answer
    Version(NegotiatedLimits),
    /// Command answer
    Results(Vec<OperationResult>),
}

#[derive(Debug, Clone)]
enum ResponseShape {
    Version,
    Commands(Vec<OperationShape>),
}

/// Incremental decoder for the response to one request frame
#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    shape: ResponseShape,
}

impl ResponseDecoder {
    /// Create a decoder for the response to `frame`
    pub fn for_frame(frame: &RequestFrame) -> Self {
        let shape = match frame.opcode {
            Opcode::RequestVersion => ResponseShape::Version,
            Opcode::ReadCommands => {
                ResponseShape::Commands(frame.operations.iter().map(OperationShape::from).collect())
            }
        };
        Self { shape }
    }

    /// Total response length, once enough of the response is known to tell
    pub fn expected_len(&self, buf: &[u8]) -> Option<usize> {
        match &self.shape {
            ResponseShape::Version => Some(HANDSHAKE_RESPONSE_SIZE),
            ResponseShape::Commands(shapes) => {
                let mask_len = success_mask_len(shapes.len());
                if buf.len() < mask_len {
                    return None;
                }
                Some(expected_results_len(shapes, &buf[..mask_len]))
            }
        }
    }

    /// Decode the response once complete
    ///
    /// Returns `Ok(None)` while more bytes are needed and an error when the
    /// buffer already holds more than the response may contain.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Response>, crate::WireError> {
        let expected = match self.expected_len(buf) {
            Some(expected) => expected,
            None => return Ok(None),
        };

        if buf.len() < expected {
            trace!("Response incomplete: {} of {} bytes", buf.len(), expected);
            return Ok(None);
        }
        if buf.len() > expected {
            return Err(crate::WireError::Trailing {
                expected,
                actual: buf.len(),
            });
        }

        let response = buf.split_to(expected).freeze();
        match &self.shape {
            ResponseShape::Version => Ok(Some(Response::Version(NegotiatedLimits::decode(
                &response,
            )?))),
            ResponseShape::Commands(shapes) => {
                Ok(Some(Response::Results(walk_results(shapes, response)?)))
            }
        }
    }
}
