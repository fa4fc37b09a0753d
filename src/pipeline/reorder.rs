//! Ordered reassembly of out-of-order completions
//!
//! Items arrive in completion order and leave in sequence order. Only the
//! items between the lowest missing id and the highest arrived id are held,
//! so memory follows the reordering window rather than the stream length.

use crossbeam_channel::Receiver;
use std::collections::BTreeMap;

use crate::audio::Chunk;
use crate::error::PipelineError;

/// Anything tagged with a stream position
pub trait Sequenced {
    fn sequence_id(&self) -> u32;
}

impl Sequenced for Chunk {
    fn sequence_id(&self) -> u32 {
        self.sequence_id
    }
}

impl<T: Sequenced, E: Sequenced> Sequenced for Result<T, E> {
    fn sequence_id(&self) -> u32 {
        match self {
            Ok(item) => item.sequence_id(),
            Err(failure) => failure.sequence_id(),
        }
    }
}

/// Totals reported once a stream is fully drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReorderSummary {
    pub emitted: u64,
    /// Largest distance seen between the newest held id and `next_expected`
    pub max_skew: u32,
    /// Largest number of items held at once
    pub max_pending: usize,
}

/// Pending set plus emission cursor
pub struct OrderedReassembler<T> {
    pending: BTreeMap<u32, T>,
    next_expected: u32,
    summary: ReorderSummary,
}

impl<T: Sequenced> Default for OrderedReassembler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sequenced> OrderedReassembler<T> {
    /// Reassembler for a stream numbered from 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: first,
            summary: ReorderSummary::default(),
        }
    }

    /// Lowest id not yet emitted
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn summary(&self) -> ReorderSummary {
        self.summary
    }

    /// Hold an arrived item until its turn
    pub fn insert(&mut self, item: T) -> Result<(), PipelineError> {
        let id = item.sequence_id();
        if id < self.next_expected || self.pending.contains_key(&id) {
            return Err(PipelineError::DuplicateSequence(id));
        }

        self.pending.insert(id, item);
        self.summary.max_pending = self.summary.max_pending.max(self.pending.len());
        if let Some((&newest, _)) = self.pending.last_key_value() {
            self.summary.max_skew = self.summary.max_skew.max(newest - self.next_expected);
        }
        Ok(())
    }

    /// Take the item at `next_expected` if it has arrived
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_expected)?;
        self.next_expected += 1;
        self.summary.emitted += 1;
        Some(item)
    }

    /// Insert one arrival and emit everything that became contiguous.
    ///
    /// Returns how many items were emitted.
    pub fn push<F, E>(&mut self, item: T, emit: &mut F) -> Result<usize, E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<PipelineError>,
    {
        self.insert(item)?;

        let mut emitted = 0;
        while let Some(ready) = self.pop_ready() {
            emit(ready)?;
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Close the stream; anything still held means an id never completed
    pub fn finish(self) -> Result<ReorderSummary, PipelineError> {
        if !self.pending.is_empty() {
            tracing::error!(
                "Reassembly stalled: sequence {} never completed, {} later results stranded",
                self.next_expected,
                self.pending.len()
            );
            return Err(PipelineError::Incomplete {
                next_expected: self.next_expected,
                pending: self.pending.len(),
            });
        }
        Ok(self.summary)
    }

    /// Drain a results queue until it closes, emitting in sequence order
    pub fn run<F, E>(mut self, results: &Receiver<T>, mut emit: F) -> Result<ReorderSummary, E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<PipelineError>,
    {
        for item in results.iter() {
            self.push(item, &mut emit)?;
        }
        let summary = self.finish()?;
        tracing::debug!(
            "Reassembly done: {} emitted, max skew {}, max pending {}",
            summary.emitted,
            summary.max_skew,
            summary.max_pending
        );
        Ok(summary)
    }
}
