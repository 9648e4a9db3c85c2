//! Basic usage example for the memlink wire protocol.

use bytes::{Bytes, BytesMut};
use memlink_wire::{
    Chunker, NegotiatedLimits, Operation, Reassembler, RequestFrame, Response, ResponseDecoder,
    Target,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Memlink Wire Protocol Example ===\n");

    // 1. Handshake
    println!("1. Building the REQUEST_VERSION frame...");
    let hello = RequestFrame::version_request();
    println!("   Request bytes: {:02x?}", &hello.encode()[..]);

    let limits = NegotiatedLimits::decode(&[0, 0, 0, 1, 0, 0, 3, 32, 0, 0, 3, 32, 0, 0, 0, 16])?;
    println!("   Peer limits: {:?}", limits);

    // 2. A batch with a partial failure
    println!("\n2. Encoding a three-operation batch...");
    let frame = RequestFrame::commands(
        vec![0x8000_0000, 0x803C_0000],
        vec![
            Operation::read(0, 6, None)?,
            Operation::read(1, 4, Some(0x10))?,
            Operation::write(1, Bytes::from_static(&[0x01]), Some(0x20))?,
        ],
    )?;
    println!("   Request bytes: {:02x?}", &frame.encode()[..]);

    let decoder = ResponseDecoder::for_frame(&frame);
    let mut response = BytesMut::from(&b"\x05GZ2E01"[..]);
    if let Some(Response::Results(results)) = decoder.decode(&mut response)? {
        for (i, result) in results.iter().enumerate() {
            println!("   op {}: {:?}", i, result);
        }
    }

    // 3. Chunking a long span
    println!("\n3. Chunking a 200-byte pointer write...");
    let chunks = Chunker::new().split(
        Target::Indirect {
            pointer: 0x803C_0000,
            offset: 4,
        },
        200,
    )?;
    for chunk in &chunks {
        println!(
            "   offset {:?}, {} bytes",
            chunk.indirect_offset, chunk.len
        );
    }

    let mut reassembler = Reassembler::new(200);
    for chunk in &chunks {
        reassembler.push(&vec![0u8; chunk.len]);
    }
    println!("   Reassembled {} bytes", reassembler.finish().len());

    Ok(())
}
