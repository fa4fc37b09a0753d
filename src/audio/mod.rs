//! Audio stream types and sample conversion

pub mod chunk;
pub mod sample;

pub use chunk::{AudioDescriptor, Chunk, FORMAT_IEEE_FLOAT, FORMAT_PCM};
pub use sample::{decode_samples, encode_samples, DecodedSamples, SampleEncoding};
