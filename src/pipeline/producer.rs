//! Chunk producer: turns a container's data region into sequence-numbered chunks

use std::io::{Read, Seek};

use crate::audio::{AudioDescriptor, Chunk};
use crate::container::WavReader;
use crate::error::{ContainerError, PipelineError};

/// Outcome of one [`ChunkProducer::advance`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    /// Chunk read by this call, if any
    pub chunk: Option<Chunk>,
    /// No more samples remain after this call
    pub exhausted: bool,
}

/// Lazy, resettable sequence of chunks over a [`WavReader`].
///
/// Sequence ids start at 1 and increase by one per chunk.
pub struct ChunkProducer<R> {
    reader: WavReader<R>,
    chunk_frames: usize,
    /// Id of the last chunk handed out (0 before the first)
    sequence: u32,
}

impl<R: Read + Seek> ChunkProducer<R> {
    pub fn new(reader: WavReader<R>, chunk_frames: usize) -> Result<Self, PipelineError> {
        if chunk_frames == 0 {
            return Err(PipelineError::InvalidConfig("chunk size must be at least one frame".into()));
        }
        Ok(Self {
            reader,
            chunk_frames,
            sequence: 0,
        })
    }

    pub fn descriptor(&self) -> AudioDescriptor {
        self.reader.descriptor()
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    /// Bytes in a full-size chunk
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames * self.descriptor().frame_size()
    }

    /// Declared size of the whole data region
    pub fn data_len(&self) -> u64 {
        self.reader.data_len()
    }

    /// Number of chunks a complete pass produces
    pub fn expected_chunks(&self) -> usize {
        expected_chunks(self.reader.data_len(), self.chunk_bytes() as u64)
    }

    /// Id of the most recently produced chunk
    pub fn last_sequence_id(&self) -> u32 {
        self.sequence
    }

    /// Read up to `frames` frames as the next chunk.
    ///
    /// `frames <= 0` reads nothing and only reports whether the stream is
    /// exhausted. Once exhausted, every call returns no chunk.
    pub fn advance(&mut self, frames: i64) -> Result<Advance, ContainerError> {
        if frames <= 0 || self.reader.is_exhausted() {
            return Ok(Advance {
                chunk: None,
                exhausted: self.reader.is_exhausted(),
            });
        }

        let descriptor = self.reader.descriptor();
        let max_bytes = (frames as usize).saturating_mul(descriptor.frame_size());
        let bytes = self.reader.read_window(max_bytes)?;
        if bytes.is_empty() {
            return Ok(Advance {
                chunk: None,
                exhausted: true,
            });
        }

        self.sequence += 1;
        let chunk = Chunk::new(self.sequence, descriptor, bytes);
        tracing::trace!("Produced chunk {} ({} frames)", chunk.sequence_id, chunk.frames());

        Ok(Advance {
            chunk: Some(chunk),
            exhausted: self.reader.is_exhausted(),
        })
    }

    /// Next chunk at the configured size, `None` once exhausted
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, ContainerError> {
        Ok(self.advance(self.chunk_frames as i64)?.chunk)
    }

    /// Frames left, without consuming them
    pub fn remaining_samples(&self) -> u64 {
        self.reader.remaining_bytes() / self.descriptor().frame_size() as u64
    }

    /// Rewind to the first sample and restart sequence numbering
    pub fn reset(&mut self) -> Result<(), ContainerError> {
        self.reader.rewind()?;
        self.sequence = 0;
        Ok(())
    }
}

impl<R: Read + Seek> Iterator for ChunkProducer<R> {
    type Item = Result<Chunk, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Chunks needed to carry `data_len` bytes in `chunk_bytes`-sized pieces
pub fn expected_chunks(data_len: u64, chunk_bytes: u64) -> usize {
    if chunk_bytes == 0 {
        return 0;
    }
    data_len.div_ceil(chunk_bytes) as usize
}
