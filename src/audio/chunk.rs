//! Stream descriptor and sequence-numbered chunks

use bytes::Bytes;

use crate::error::ContainerError;

/// Integer PCM format tag
pub const FORMAT_PCM: u16 = 1;

/// IEEE float format tag
pub const FORMAT_IEEE_FLOAT: u16 = 3;

/// Audio layout of one stream, fixed for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioDescriptor {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample
    pub bit_depth: u16,
    /// Container format tag (1 = PCM, 3 = IEEE float)
    pub format_code: u16,
}

impl AudioDescriptor {
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16, format_code: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
            format_code,
        }
    }

    /// Integer PCM descriptor
    pub fn pcm(sample_rate: u32, channels: u16, bit_depth: u16) -> Self {
        Self::new(sample_rate, channels, bit_depth, FORMAT_PCM)
    }

    /// Bytes per single-channel sample
    pub fn bytes_per_sample(&self) -> usize {
        (self.bit_depth / 8) as usize
    }

    /// Bytes per frame (one sample for every channel)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bytes_per_sample()
    }

    /// Header byte rate; saturates for layouts [`validate`](Self::validate) rejects
    pub fn byte_rate(&self) -> u32 {
        u32::try_from(self.wide_byte_rate()).unwrap_or(u32::MAX)
    }

    /// Header block align; saturates for layouts [`validate`](Self::validate) rejects
    pub fn block_align(&self) -> u16 {
        u16::try_from(self.wide_block_align()).unwrap_or(u16::MAX)
    }

    fn wide_byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.wide_block_align() as u64
    }

    fn wide_block_align(&self) -> u32 {
        self.channels as u32 * self.bit_depth as u32 / 8
    }

    /// Reject layouts no frame size can be derived from, or whose header
    /// fields do not fit their on-disk widths
    pub fn validate(&self) -> Result<(), ContainerError> {
        if self.channels == 0 {
            return Err(ContainerError::Unsupported("zero channels".into()));
        }
        if self.bit_depth == 0 || self.bit_depth % 8 != 0 {
            return Err(ContainerError::Unsupported(format!(
                "bit depth {} is not a whole number of bytes",
                self.bit_depth
            )));
        }
        if self.wide_block_align() > u16::MAX as u32 {
            return Err(ContainerError::Unsupported(format!(
                "{} channels of {} bits exceed the 16-bit block align field",
                self.channels, self.bit_depth
            )));
        }
        if self.wide_byte_rate() > u32::MAX as u64 {
            return Err(ContainerError::Unsupported(format!(
                "byte rate of {} Hz x {} bytes per frame exceeds 32 bits",
                self.sample_rate,
                self.wide_block_align()
            )));
        }
        Ok(())
    }

    /// Byte value of digital silence for this encoding
    pub fn silence_byte(&self) -> u8 {
        if self.format_code == FORMAT_PCM && self.bit_depth == 8 {
            0x80
        } else {
            0
        }
    }
}

/// Sequence-numbered slice of raw audio moving through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the stream, starting at 1
    pub sequence_id: u32,
    pub descriptor: AudioDescriptor,
    /// Raw little-endian sample bytes
    pub samples: Bytes,
}

impl Chunk {
    pub fn new(sequence_id: u32, descriptor: AudioDescriptor, samples: impl Into<Bytes>) -> Self {
        Self {
            sequence_id,
            descriptor,
            samples: samples.into(),
        }
    }

    /// Number of whole frames carried
    pub fn frames(&self) -> usize {
        match self.descriptor.frame_size() {
            0 => 0,
            frame_size => self.samples.len() / frame_size,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Same stream position and layout, new sample bytes
    pub fn with_samples(&self, samples: impl Into<Bytes>) -> Self {
        Self {
            sequence_id: self.sequence_id,
            descriptor: self.descriptor,
            samples: samples.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_derived_sizes() {
        let desc = AudioDescriptor::pcm(44100, 2, 16);
        assert_eq!(desc.frame_size(), 4);
        assert_eq!(desc.block_align(), 4);
        assert_eq!(desc.byte_rate(), 176_400);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_oversized_layout_rejected() {
        let wide = AudioDescriptor::pcm(8000, 32_768, 32);
        assert_eq!(wide.frame_size(), 131_072);
        assert_eq!(wide.block_align(), u16::MAX);
        assert!(matches!(wide.validate(), Err(ContainerError::Unsupported(_))));

        let fast = AudioDescriptor::pcm(u32::MAX, 2, 16);
        assert_eq!(fast.byte_rate(), u32::MAX);
        assert!(matches!(fast.validate(), Err(ContainerError::Unsupported(_))));

        assert!(AudioDescriptor::pcm(192_000, 2048, 32).validate().is_ok());
    }

    #[test]
    fn test_descriptor_rejects_partial_bytes() {
        assert!(AudioDescriptor::pcm(8000, 1, 12).validate().is_err());
        assert!(AudioDescriptor::pcm(8000, 0, 16).validate().is_err());
    }

    #[test]
    fn test_chunk_frames_ignores_partial_tail() {
        let chunk = Chunk::new(1, AudioDescriptor::pcm(8000, 2, 16), vec![0u8; 10]);
        assert_eq!(chunk.frames(), 2);
        assert_eq!(chunk.len(), 10);
    }
}
