//! Pluggable per-chunk sample transforms
//!
//! A transform sees one chunk's interleaved samples, normalized to
//! `[-1.0, 1.0]`, and rewrites them in place. It keeps no state between
//! chunks, so chunks can be processed on any worker in any order. Filters
//! therefore restart at every chunk boundary, which is audible with small
//! chunks.

pub mod gain;
pub mod lowpass;

pub use gain::Gain;
pub use lowpass::LowPass;

use std::sync::Arc;

use crate::audio::{decode_samples, encode_samples, AudioDescriptor, Chunk};
use crate::config::TransformConfig;
use crate::error::TransformError;

/// Stateless transform over one chunk of normalized samples
pub trait SampleTransform: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Rewrite interleaved samples in place
    fn apply(&self, samples: &mut [f64], descriptor: &AudioDescriptor);
}

/// Passes samples through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl SampleTransform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, _samples: &mut [f64], _descriptor: &AudioDescriptor) {}
}

/// Decode a chunk, run the transform and re-encode at the chunk's bit depth.
///
/// The result keeps the chunk's sequence id, descriptor and byte length.
pub fn process_chunk(transform: &dyn SampleTransform, chunk: &Chunk) -> Result<Chunk, TransformError> {
    let mut decoded = decode_samples(&chunk.samples, &chunk.descriptor)?;
    transform.apply(&mut decoded.samples, &chunk.descriptor);
    let bytes = encode_samples(&decoded.samples, &decoded.remainder, &chunk.descriptor)?;
    Ok(chunk.with_samples(bytes))
}

/// Build the configured transform
pub fn from_config(config: &TransformConfig) -> Result<Arc<dyn SampleTransform>, TransformError> {
    let transform: Arc<dyn SampleTransform> = match config {
        TransformConfig::Identity => Arc::new(Identity),
        TransformConfig::Gain { db } => Arc::new(Gain::from_db(*db)?),
        TransformConfig::LowPass { keep_fraction } => Arc::new(LowPass::new(*keep_fraction)?),
    };
    tracing::info!("Using {} transform", transform.name());
    Ok(transform)
}
