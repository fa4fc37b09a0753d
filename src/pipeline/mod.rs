//! Chunk pipeline: production, parallel transform, ordered and sink-side reassembly

pub mod pool;
pub mod producer;
pub mod reorder;
pub mod slots;

pub use pool::{ChunkFailure, Completed, PoolInput, PoolSummary, RunningPool, WorkerPool};
pub use producer::{expected_chunks, Advance, ChunkProducer};
pub use reorder::{OrderedReassembler, ReorderSummary, Sequenced};
pub use slots::{GapPolicy, ReassemblyReport, ReceiveSlots, SlotInsert, StreamLayout, StreamReassembler};

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::config::PipelineConfig;
use crate::container::{write_wav_file, WavReader};
use crate::error::{Error, PipelineError, Result};
use crate::transform::SampleTransform;

/// Totals for an in-process run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSummary {
    pub chunks: u64,
    pub bytes: u64,
    pub pool: PoolSummary,
    pub reorder: ReorderSummary,
}

/// Run a container through the worker pool without a network hop
pub fn process_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &PipelineConfig,
    transform: Arc<dyn SampleTransform>,
) -> Result<LocalSummary> {
    let reader = WavReader::open(input.as_ref())?;
    let descriptor = reader.descriptor();
    let producer = ChunkProducer::new(reader, config.chunk_frames)?;

    let RunningPool {
        input: pool_input,
        output: results,
        handle,
    } = WorkerPool::new(config.workers)
        .with_queue_capacity(config.queue_capacity())
        .spawn(transform)?;

    let feeder = thread::Builder::new()
        .name("chunk-producer".to_string())
        .spawn(move || -> Result<()> {
            for chunk in producer {
                pool_input.submit(chunk?)?;
            }
            pool_input.close();
            Ok(())
        })
        .map_err(PipelineError::Spawn)?;

    let mut buffers: Vec<Bytes> = Vec::new();
    let reordered = OrderedReassembler::new().run(&results, |completed: Completed| -> Result<()> {
        let chunk = completed.map_err(|failure| Error::Transform(failure.error))?;
        buffers.push(chunk.samples);
        Ok(())
    });
    // Unblocks the workers (and through them the feeder) if reassembly stopped early
    drop(results);

    let fed = feeder
        .join()
        .map_err(|_| Error::Pipeline(PipelineError::WorkerPanicked(1)))?;
    let pool = handle.join()?;
    let reorder = reordered?;
    fed?;

    let bytes = write_wav_file(output.as_ref(), &descriptor, &buffers)?;
    Ok(LocalSummary {
        chunks: reorder.emitted,
        bytes,
        pool,
        reorder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioDescriptor;
    use crate::transform::{Gain, Identity};

    fn write_fixture(path: &Path, desc: AudioDescriptor, data: &[u8]) {
        write_wav_file(path, &desc, &[data]).unwrap();
    }

    #[test]
    fn test_identity_round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        let data: Vec<u8> = (0..30_001u32).map(|i| (i * 7 % 256) as u8).collect();
        write_fixture(&input, AudioDescriptor::pcm(22050, 2, 16), &data);

        for chunk_frames in [1, 100, 4096, 100_000] {
            let config = PipelineConfig {
                chunk_frames,
                workers: 3,
                queue_capacity: None,
            };
            let summary = process_file(&input, &output, &config, Arc::new(Identity)).unwrap();
            assert_eq!(summary.bytes, data.len() as u64);
            assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
        }
    }

    #[test]
    fn test_unsupported_encoding_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_fixture(&input, AudioDescriptor::new(8000, 1, 16, 3), &[0u8; 4000]);

        let config = PipelineConfig {
            chunk_frames: 10,
            workers: 2,
            queue_capacity: None,
        };
        let err = process_file(&input, &output, &config, Arc::new(Gain::from_db(0.0).unwrap()));
        assert!(matches!(err, Err(Error::Transform(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_malformed_input_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.wav");
        let output = dir.path().join("out.wav");
        std::fs::write(&input, b"RIFF\x04\x00\x00\x00WAVE").unwrap();

        let err = process_file(&input, &output, &PipelineConfig::default(), Arc::new(Identity));
        assert!(matches!(err, Err(Error::Container(_))));
        assert!(!output.exists());
    }
}
