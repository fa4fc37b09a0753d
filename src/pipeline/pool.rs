//! Bounded worker pool for per-chunk transforms
//!
//! ```text
//!              ┌──────────┐
//!   input ───▶ │ worker 0 │ ───┐
//!  (2W deep)   ├──────────┤    │
//!         ───▶ │ worker 1 │ ───┼──▶ output (2W deep)
//!              ├──────────┤    │
//!         ───▶ │ worker … │ ───┘
//!              └──────────┘
//!                   ▲
//!              barrier thread: joins every worker, then closes output
//! ```
//!
//! Full queues block the sender, which is the pipeline's backpressure.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::Chunk;
use crate::constants::QUEUE_DEPTH_PER_WORKER;
use crate::error::{PipelineError, TransformError};
use crate::pipeline::reorder::Sequenced;
use crate::transform::{process_chunk, SampleTransform};

/// A chunk the transform could not process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFailure {
    pub sequence_id: u32,
    pub error: TransformError,
}

impl Sequenced for ChunkFailure {
    fn sequence_id(&self) -> u32 {
        self.sequence_id
    }
}

/// Result of one chunk leaving the pool
pub type Completed = Result<Chunk, ChunkFailure>;

/// Live counters shared by the workers
#[derive(Debug, Default)]
pub struct PoolStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl PoolStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Final pool totals, returned by the completion barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub processed: u64,
    pub failed: u64,
    pub panicked_workers: usize,
}

/// Pool configuration; [`WorkerPool::spawn`] starts the threads
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// `workers` threads with queues of `2 * workers`
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            queue_capacity: workers * QUEUE_DEPTH_PER_WORKER,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Start the workers and the completion barrier
    pub fn spawn(self, transform: Arc<dyn SampleTransform>) -> Result<RunningPool, PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig("worker pool needs at least one worker".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PipelineError::InvalidConfig("pool queues need capacity of at least one".into()));
        }

        let (input_tx, input_rx) = bounded::<Chunk>(self.queue_capacity);
        let (output_tx, output_rx) = bounded::<Completed>(self.queue_capacity);
        let stats = Arc::new(PoolStats::default());

        let mut handles = Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            let jobs = input_rx.clone();
            let results = output_tx.clone();
            let transform = transform.clone();
            let stats = stats.clone();

            let handle = thread::Builder::new()
                .name(format!("pool-worker-{}", index))
                .spawn(move || worker_loop(index, jobs, results, transform, stats))
                .map_err(PipelineError::Spawn)?;
            handles.push(handle);
        }
        // Workers hold the only receivers of the input queue
        drop(input_rx);

        let barrier_stats = stats.clone();
        let barrier = thread::Builder::new()
            .name("pool-barrier".to_string())
            .spawn(move || {
                let mut panicked_workers = 0;
                for (index, handle) in handles.into_iter().enumerate() {
                    if handle.join().is_err() {
                        tracing::error!("Worker {} panicked", index);
                        panicked_workers += 1;
                    }
                }
                // Output closes only after every worker has stopped
                drop(output_tx);

                PoolSummary {
                    processed: barrier_stats.processed(),
                    failed: barrier_stats.failed(),
                    panicked_workers,
                }
            })
            .map_err(PipelineError::Spawn)?;

        tracing::debug!(
            "Worker pool started: {} workers, queue capacity {}",
            self.workers,
            self.queue_capacity
        );

        Ok(RunningPool {
            input: PoolInput { tx: input_tx },
            output: output_rx,
            handle: PoolHandle { barrier, stats },
        })
    }
}

fn worker_loop(
    index: usize,
    jobs: Receiver<Chunk>,
    results: Sender<Completed>,
    transform: Arc<dyn SampleTransform>,
    stats: Arc<PoolStats>,
) {
    for chunk in jobs.iter() {
        let sequence_id = chunk.sequence_id;
        let completed = match process_chunk(transform.as_ref(), &chunk) {
            Ok(processed) => {
                stats.processed.fetch_add(1, Ordering::Relaxed);
                Ok(processed)
            }
            Err(error) => {
                tracing::warn!("Worker {}: chunk {} failed: {}", index, sequence_id, error);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                Err(ChunkFailure { sequence_id, error })
            }
        };

        if results.send(completed).is_err() {
            tracing::debug!("Worker {}: output queue dropped, stopping", index);
            return;
        }
    }
    tracing::trace!("Worker {}: input closed and drained", index);
}

/// The three ends of a started pool
pub struct RunningPool {
    pub input: PoolInput,
    pub output: Receiver<Completed>,
    pub handle: PoolHandle,
}

/// Submission side of the input queue
#[derive(Clone)]
pub struct PoolInput {
    tx: Sender<Chunk>,
}

impl PoolInput {
    /// Queue a chunk, blocking while the queue is full
    pub fn submit(&self, chunk: Chunk) -> Result<(), PipelineError> {
        self.tx.send(chunk).map_err(|_| PipelineError::QueueClosed)
    }

    /// Chunks waiting for a worker
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    /// No more chunks will be submitted through this handle
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Owner of the barrier thread
pub struct PoolHandle {
    barrier: JoinHandle<PoolSummary>,
    stats: Arc<PoolStats>,
}

impl PoolHandle {
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Wait for every worker to stop (the input must be closed first)
    pub fn join(self) -> Result<PoolSummary, PipelineError> {
        let summary = self
            .barrier
            .join()
            .map_err(|_| PipelineError::WorkerPanicked(1))?;
        if summary.panicked_workers > 0 {
            return Err(PipelineError::WorkerPanicked(summary.panicked_workers));
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioDescriptor, FORMAT_IEEE_FLOAT};
    use crate::pipeline::reorder::OrderedReassembler;
    use crate::transform::Identity;
    use std::time::Duration;

    /// Identity with a latency that depends on the chunk contents
    struct Jittery;

    impl SampleTransform for Jittery {
        fn name(&self) -> &str {
            "jittery"
        }

        fn apply(&self, samples: &mut [f64], _descriptor: &AudioDescriptor) {
            let delay = samples.first().map(|s| (s.abs() * 1000.0) as u64 % 7).unwrap_or(0);
            thread::sleep(Duration::from_millis(delay));
        }
    }

    fn chunk(id: u32) -> Chunk {
        let value = ((id * 4099) % 30_000) as i16;
        let bytes: Vec<u8> = std::iter::repeat(value.to_le_bytes()).take(16).flatten().collect();
        Chunk::new(id, AudioDescriptor::pcm(8000, 1, 16), bytes)
    }

    #[test]
    fn test_rejects_empty_pool() {
        assert!(WorkerPool::new(0).spawn(Arc::new(Identity)).is_err());
        assert!(WorkerPool::new(2).with_queue_capacity(0).spawn(Arc::new(Identity)).is_err());
    }

    #[test]
    fn test_every_chunk_completes_once() {
        let RunningPool { input, output, handle } = WorkerPool::new(3).spawn(Arc::new(Jittery)).unwrap();

        let producer = thread::spawn(move || {
            for id in 1..=40 {
                input.submit(chunk(id)).unwrap();
            }
            input.close();
        });

        let mut seen: Vec<u32> = output.iter().map(|c| c.unwrap().sequence_id).collect();
        producer.join().unwrap();
        let summary = handle.join().unwrap();

        seen.sort_unstable();
        assert_eq!(seen, (1..=40).collect::<Vec<_>>());
        assert_eq!(summary.processed, 40);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_pool_with_reassembler_restores_order() {
        let RunningPool { input, output, handle } = WorkerPool::new(4).spawn(Arc::new(Jittery)).unwrap();

        let producer = thread::spawn(move || {
            for id in 1..=60 {
                input.submit(chunk(id)).unwrap();
            }
            input.close();
        });

        let mut emitted = Vec::new();
        OrderedReassembler::new()
            .run(&output, |completed: Completed| -> Result<(), PipelineError> {
                let chunk = completed.unwrap();
                assert_eq!(chunk, self::chunk(chunk.sequence_id));
                emitted.push(chunk.sequence_id);
                Ok(())
            })
            .unwrap();
        producer.join().unwrap();
        handle.join().unwrap();

        assert_eq!(emitted, (1..=60).collect::<Vec<_>>());
    }

    #[test]
    fn test_transform_failure_keeps_its_slot() {
        let RunningPool { input, output, handle } = WorkerPool::new(2).spawn(Arc::new(Identity)).unwrap();

        input.submit(chunk(1)).unwrap();
        input
            .submit(Chunk::new(2, AudioDescriptor::new(8000, 1, 16, FORMAT_IEEE_FLOAT), vec![0u8; 4]))
            .unwrap();
        input.submit(chunk(3)).unwrap();
        input.close();

        let mut results: Vec<Completed> = output.iter().collect();
        results.sort_by_key(|c| c.sequence_id());
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().sequence_id, 2);
        assert!(results[2].is_ok());

        let summary = handle.join().unwrap();
        assert_eq!((summary.processed, summary.failed), (2, 1));
    }

    #[test]
    fn test_submit_after_workers_gone_fails() {
        let RunningPool { input, output, handle } = WorkerPool::new(1).spawn(Arc::new(Identity)).unwrap();
        drop(output);

        // The worker exits on its first failed send, then the input has no receivers
        let mut result = Ok(());
        for id in 1..=10 {
            result = input.submit(chunk(id));
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(PipelineError::QueueClosed)));
        input.close();
        handle.join().unwrap();
    }
}
