//! Sink-side stream reassembly
//!
//! Chunks coming back over the wire land in a fixed array of slots indexed
//! by `sequence_id - 1`. The array is sized up front from the stream layout,
//! so the final count check is a simple comparison. A short count is
//! reported, not raised: whatever arrived is still written out.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{AudioDescriptor, Chunk};
use crate::container::write_wav_file;
use crate::error::ContainerError;
use crate::pipeline::producer::expected_chunks;

/// How missing chunks appear in the written file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Leave them out; later chunks move up and the file is shorter
    #[default]
    Skip,
    /// Write silence of the missing chunk's length; later chunks keep their offsets
    Silence,
}

/// Outcome of placing one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotInsert {
    Stored,
    Duplicate,
    OutOfRange,
    DescriptorMismatch,
}

/// Shape of the stream being reassembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLayout {
    pub descriptor: AudioDescriptor,
    /// Bytes in the complete data region
    pub data_len: u64,
    /// Bytes in every chunk but possibly the last
    pub chunk_bytes: usize,
}

impl StreamLayout {
    pub fn new(descriptor: AudioDescriptor, data_len: u64, chunk_frames: usize) -> Self {
        Self {
            descriptor,
            data_len,
            chunk_bytes: chunk_frames * descriptor.frame_size(),
        }
    }

    pub fn expected_chunks(&self) -> usize {
        expected_chunks(self.data_len, self.chunk_bytes as u64)
    }

    /// Original byte length of chunk `sequence_id`
    pub fn chunk_len(&self, sequence_id: u32) -> usize {
        let start = (sequence_id as u64 - 1) * self.chunk_bytes as u64;
        self.data_len.saturating_sub(start).min(self.chunk_bytes as u64) as usize
    }
}

/// Fixed array of optional chunks
#[derive(Debug)]
pub struct ReceiveSlots {
    slots: Vec<Option<Chunk>>,
    filled: usize,
    ignored: usize,
}

impl ReceiveSlots {
    pub fn new(expected: usize) -> Self {
        Self {
            slots: vec![None; expected],
            filled: 0,
            ignored: 0,
        }
    }

    /// Place a chunk at `sequence_id - 1`; duplicates and out-of-range ids are refused
    pub fn insert(&mut self, chunk: Chunk) -> SlotInsert {
        let index = match (chunk.sequence_id as usize).checked_sub(1) {
            Some(index) if index < self.slots.len() => index,
            _ => {
                self.ignored += 1;
                return SlotInsert::OutOfRange;
            }
        };

        let slot = &mut self.slots[index];
        if slot.is_some() {
            self.ignored += 1;
            return SlotInsert::Duplicate;
        }
        *slot = Some(chunk);
        self.filled += 1;
        SlotInsert::Stored
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Sequence ids with no chunk yet
    pub fn missing(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index as u32 + 1)
            .collect()
    }

    fn report(&self) -> ReassemblyReport {
        ReassemblyReport {
            expected: self.slots.len(),
            received: self.filled,
            missing: self.missing(),
            ignored: self.ignored,
        }
    }
}

/// Completeness of a finished transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyReport {
    pub expected: usize,
    pub received: usize,
    pub missing: Vec<u32>,
    /// Arrivals dropped as duplicate, out of range or mismatched
    pub ignored: usize,
}

impl ReassemblyReport {
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}

impl fmt::Display for ReassemblyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} chunks received", self.received, self.expected)
    }
}

/// Shared slot array written by the receive loop and read at completion
#[derive(Clone)]
pub struct StreamReassembler {
    layout: StreamLayout,
    slots: Arc<Mutex<ReceiveSlots>>,
}

impl StreamReassembler {
    pub fn new(layout: StreamLayout) -> Self {
        Self {
            layout,
            slots: Arc::new(Mutex::new(ReceiveSlots::new(layout.expected_chunks()))),
        }
    }

    pub fn layout(&self) -> &StreamLayout {
        &self.layout
    }

    /// Store an arriving chunk; refused chunks are logged and dropped
    pub fn accept(&self, chunk: Chunk) -> SlotInsert {
        let sequence_id = chunk.sequence_id;
        let outcome = if chunk.descriptor != self.layout.descriptor {
            self.slots.lock().ignored += 1;
            SlotInsert::DescriptorMismatch
        } else {
            self.slots.lock().insert(chunk)
        };

        match outcome {
            SlotInsert::Stored => tracing::trace!("Stored chunk {}", sequence_id),
            SlotInsert::Duplicate => tracing::warn!("Ignoring duplicate chunk {}", sequence_id),
            SlotInsert::OutOfRange => tracing::warn!(
                "Ignoring chunk {} outside 1..={}",
                sequence_id,
                self.layout.expected_chunks()
            ),
            SlotInsert::DescriptorMismatch => {
                tracing::warn!("Ignoring chunk {} with a different audio layout", sequence_id)
            }
        }
        outcome
    }

    pub fn report(&self) -> ReassemblyReport {
        self.slots.lock().report()
    }

    /// Take the received chunks out as ordered buffers for the writer
    pub fn assemble(&self, policy: GapPolicy) -> (Vec<Bytes>, ReassemblyReport) {
        let mut slots = self.slots.lock();
        let report = slots.report();
        if !report.is_complete() {
            tracing::warn!("Reassembly mismatch: {} (missing {:?})", report, report.missing);
        }

        let silence = self.layout.descriptor.silence_byte();
        let buffers = slots
            .slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match (slot.take(), policy) {
                (Some(chunk), _) => Some(chunk.samples),
                (None, GapPolicy::Silence) => {
                    let len = self.layout.chunk_len(index as u32 + 1);
                    Some(Bytes::from(vec![silence; len]))
                }
                (None, GapPolicy::Skip) => None,
            })
            .collect();
        slots.filled = 0;

        (buffers, report)
    }

    /// Write whatever arrived to a container file
    pub fn write_to(&self, path: impl AsRef<Path>, policy: GapPolicy) -> Result<ReassemblyReport, ContainerError> {
        let (buffers, report) = self.assemble(policy);
        write_wav_file(path, &self.layout.descriptor, &buffers)?;
        Ok(report)
    }
}
