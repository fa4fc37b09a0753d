//! Conversion between raw little-endian sample bytes and normalized samples
//!
//! Normalized samples are `f64` in `[-1.0, 1.0]`. Every supported integer
//! width is exactly representable, so decoding followed by encoding returns
//! the original bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::audio::chunk::{AudioDescriptor, FORMAT_IEEE_FLOAT, FORMAT_PCM};
use crate::error::TransformError;

/// Sample encodings the transforms understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// 8-bit unsigned, silence at 128
    U8,
    I16,
    I24,
    I32,
    F32,
}

impl SampleEncoding {
    pub fn from_descriptor(desc: &AudioDescriptor) -> Result<Self, TransformError> {
        match (desc.format_code, desc.bit_depth) {
            (FORMAT_PCM, 8) => Ok(Self::U8),
            (FORMAT_PCM, 16) => Ok(Self::I16),
            (FORMAT_PCM, 24) => Ok(Self::I24),
            (FORMAT_PCM, 32) => Ok(Self::I32),
            (FORMAT_IEEE_FLOAT, 32) => Ok(Self::F32),
            (format_code, bit_depth) => Err(TransformError::UnsupportedEncoding {
                format_code,
                bit_depth,
            }),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I24 => 3,
            Self::I32 | Self::F32 => 4,
        }
    }

    /// Full-scale magnitude for integer encodings
    fn scale(&self) -> f64 {
        match self {
            Self::U8 => 128.0,
            Self::I16 => 32_768.0,
            Self::I24 => 8_388_608.0,
            Self::I32 => 2_147_483_648.0,
            Self::F32 => 1.0,
        }
    }

    fn decode_one(&self, bytes: &[u8]) -> f64 {
        match self {
            Self::U8 => (bytes[0] as i32 - 128) as f64 / self.scale(),
            Self::I16 => LittleEndian::read_i16(bytes) as f64 / self.scale(),
            Self::I24 => LittleEndian::read_i24(bytes) as f64 / self.scale(),
            Self::I32 => LittleEndian::read_i32(bytes) as f64 / self.scale(),
            Self::F32 => LittleEndian::read_f32(bytes) as f64,
        }
    }

    fn encode_one(&self, sample: f64, out: &mut [u8]) {
        match self {
            Self::U8 => out[0] = (self.quantize(sample) + 128) as u8,
            Self::I16 => LittleEndian::write_i16(out, self.quantize(sample) as i16),
            Self::I24 => LittleEndian::write_i24(out, self.quantize(sample) as i32),
            Self::I32 => LittleEndian::write_i32(out, self.quantize(sample) as i32),
            Self::F32 => LittleEndian::write_f32(out, sample as f32),
        }
    }

    fn quantize(&self, sample: f64) -> i64 {
        let scale = self.scale();
        // Truncates toward zero, then pins +1.0 to the largest positive code
        ((sample.clamp(-1.0, 1.0) * scale) as i64).clamp(-(scale as i64), scale as i64 - 1)
    }
}

/// Decoded samples plus any trailing bytes that do not form a whole sample
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSamples {
    pub samples: Vec<f64>,
    pub remainder: Vec<u8>,
}

/// Decode interleaved sample bytes into normalized samples
pub fn decode_samples(bytes: &[u8], desc: &AudioDescriptor) -> Result<DecodedSamples, TransformError> {
    let encoding = SampleEncoding::from_descriptor(desc)?;
    let width = encoding.width();
    let whole = bytes.len() - bytes.len() % width;

    let samples = bytes[..whole]
        .chunks_exact(width)
        .map(|raw| encoding.decode_one(raw))
        .collect();

    Ok(DecodedSamples {
        samples,
        remainder: bytes[whole..].to_vec(),
    })
}

/// Encode normalized samples at the descriptor's bit depth, appending `remainder` verbatim
pub fn encode_samples(
    samples: &[f64],
    remainder: &[u8],
    desc: &AudioDescriptor,
) -> Result<Vec<u8>, TransformError> {
    let encoding = SampleEncoding::from_descriptor(desc)?;
    let width = encoding.width();
    let mut out = vec![0u8; samples.len() * width + remainder.len()];

    for (sample, slot) in samples.iter().zip(out.chunks_exact_mut(width)) {
        encoding.encode_one(*sample, slot);
    }
    out[samples.len() * width..].copy_from_slice(remainder);

    Ok(out)
}
