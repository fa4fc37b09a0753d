//! Streaming client
//!
//! Sends a container's chunks as requests while a receiver thread collects
//! the responses into [`StreamReassembler`] slots. Once the server half-closes
//! whatever arrived is written out, complete or not.

use std::io::{Read, Seek};
use std::net::TcpStream;
use std::path::Path;
use std::thread;

use crate::config::AppConfig;
use crate::container::WavReader;
use crate::error::{Error, PipelineError, ProtocolError, Result};
use crate::network::connection::{split, MessageReader, MessageWriter};
use crate::network::socket::connect;
use crate::pipeline::{ChunkProducer, ReassemblyReport, StreamLayout, StreamReassembler};
use crate::protocol::{decode_chunk, ErrorReport, Message, MessageType};

/// Outcome of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub chunks_sent: u64,
    /// Chunks the server answered with an Error message
    pub failed_chunks: Vec<u32>,
    pub reassembly: ReassemblyReport,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.reassembly.is_complete()
    }
}

/// Stream `input` through the configured server and write the result to `output`.
///
/// A malformed input fails before any connection is made. A transfer that
/// ends with chunks missing still writes the file and reports the shortfall.
pub fn stream_file(config: &AppConfig, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<TransferReport> {
    config.validate()?;
    let reader = WavReader::open(input.as_ref())?;
    let mut producer = ChunkProducer::new(reader, config.pipeline.chunk_frames)?;

    let addr = config.network.server_socket_addr()?;
    let stream = connect(addr, &config.network)?;
    transfer(stream, &mut producer, output.as_ref(), config)
}

fn transfer<R: Read + Seek>(
    stream: TcpStream,
    producer: &mut ChunkProducer<R>,
    output: &Path,
    config: &AppConfig,
) -> Result<TransferReport> {
    let layout = StreamLayout::new(producer.descriptor(), producer.data_len(), producer.chunk_frames());
    let sink = StreamReassembler::new(layout);
    let (mut reader, mut writer) = split(stream, config.network.max_frame_len)?;

    tracing::info!(
        "Streaming {} chunks ({} bytes) to {}",
        layout.expected_chunks(),
        layout.data_len,
        writer.peer_addr()
    );

    let receiver_sink = sink.clone();
    let span = tracing::Span::current();
    let receiver = thread::Builder::new()
        .name("stream-receiver".to_string())
        .spawn(move || {
            span.in_scope(|| {
                let received = receive_responses(&mut reader, &receiver_sink);
                if let Err(e) = &received {
                    // Nobody reads responses from here on; fail the sender instead of stalling it
                    tracing::warn!("Receiving stopped: {}", e);
                    reader.abort();
                }
                received
            })
        })
        .map_err(PipelineError::Spawn)?;

    let sent = send_chunks(producer, &mut writer).and_then(|count| {
        writer.half_close()?;
        Ok(count)
    });
    if let Err(e) = &sent {
        tracing::warn!("Sending stopped: {}", e);
        writer.abort();
    }

    let received = receiver
        .join()
        .map_err(|_| Error::Pipeline(PipelineError::WorkerPanicked(1)))?;
    // A receive failure is the cause of any send failure it triggered
    let failed_chunks = received?;
    let chunks_sent = sent?;

    let reassembly = sink.write_to(output, config.output.gap_policy)?;
    if reassembly.is_complete() {
        tracing::info!("Transfer complete: {}", reassembly);
    }

    Ok(TransferReport {
        chunks_sent,
        failed_chunks,
        reassembly,
    })
}

fn send_chunks<R: Read + Seek>(producer: &mut ChunkProducer<R>, writer: &mut MessageWriter) -> Result<u64> {
    let mut sent = 0;
    while let Some(chunk) = producer.next_chunk()? {
        writer.send(&Message::request(&chunk))?;
        sent += 1;
    }
    tracing::debug!("All {} requests sent", sent);
    Ok(sent)
}

/// Collect responses until the server half-closes; returns the ids it failed
fn receive_responses(reader: &mut MessageReader, sink: &StreamReassembler) -> Result<Vec<u32>> {
    let mut failed = Vec::new();

    while let Some(msg) = reader.recv()? {
        match msg.kind {
            MessageType::ResponseAudio => {
                sink.accept(decode_chunk(msg.payload)?);
            }
            MessageType::Error => match msg.error_report() {
                Some(ErrorReport {
                    sequence_id: Some(id),
                    text,
                }) => {
                    tracing::warn!("Server could not process chunk {}: {}", id, text);
                    failed.push(id);
                }
                Some(ErrorReport { sequence_id: None, text }) => {
                    tracing::warn!("Server reported: {}", text);
                }
                None => tracing::warn!("Server sent an unreadable error message"),
            },
            MessageType::RequestAudio => {
                return Err(ProtocolError::UnexpectedMessage(msg.kind).into());
            }
        }
    }
    Ok(failed)
}
