//! Chunk serialization inside RequestAudio/ResponseAudio payloads
//!
//! ```text
//! sampleRate:u32 | channels:u16 | bitDepth:u16 | formatCode:u16 |
//! sequenceID:u32 | sampleByteLen:u32 | sampleBytes        (all LE)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::audio::{AudioDescriptor, Chunk};
use crate::error::ProtocolError;

/// Fixed part of the chunk payload
pub const CHUNK_HEADER_LEN: usize = 18;

pub fn encode_chunk(chunk: &Chunk) -> Bytes {
    let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + chunk.samples.len());
    buf.put_u32_le(chunk.descriptor.sample_rate);
    buf.put_u16_le(chunk.descriptor.channels);
    buf.put_u16_le(chunk.descriptor.bit_depth);
    buf.put_u16_le(chunk.descriptor.format_code);
    buf.put_u32_le(chunk.sequence_id);
    buf.put_u32_le(chunk.samples.len() as u32);
    buf.put_slice(&chunk.samples);
    buf.freeze()
}

/// Parse a chunk payload; the sample bytes share the payload's allocation
pub fn decode_chunk(mut payload: Bytes) -> Result<Chunk, ProtocolError> {
    if payload.len() < CHUNK_HEADER_LEN {
        return Err(ProtocolError::MalformedPayload(format!(
            "chunk header needs {} bytes, got {}",
            CHUNK_HEADER_LEN,
            payload.len()
        )));
    }

    let descriptor = AudioDescriptor {
        sample_rate: payload.get_u32_le(),
        channels: payload.get_u16_le(),
        bit_depth: payload.get_u16_le(),
        format_code: payload.get_u16_le(),
    };
    let sequence_id = payload.get_u32_le();
    let sample_len = payload.get_u32_le() as usize;

    if sequence_id == 0 {
        return Err(ProtocolError::MalformedPayload("sequence id 0".into()));
    }
    if descriptor.validate().is_err() {
        return Err(ProtocolError::MalformedPayload(format!(
            "invalid descriptor: {} channels, {} bits",
            descriptor.channels, descriptor.bit_depth
        )));
    }
    if payload.len() != sample_len {
        return Err(ProtocolError::MalformedPayload(format!(
            "declared {} sample bytes, payload carries {}",
            sample_len,
            payload.len()
        )));
    }

    Ok(Chunk {
        sequence_id,
        descriptor,
        samples: payload,
    })
}
