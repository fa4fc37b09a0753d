//! Processing service
//!
//! Every accepted connection is one stream. It gets its own worker pool and
//! runs on a blocking thread:
//!
//! ```text
//!   socket ─▶ receive_requests ─▶ pool input ─▶ workers ─▶ pool output
//!                                                              │
//!   socket ◀──────────── respond (ordered reassembler) ◀───────┘
//! ```
//!
//! A failing connection is dropped on its own; the listener keeps accepting.

use std::future::Future;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::{AppConfig, NetworkConfig, PipelineConfig};
use crate::error::{Error, PipelineError, ProtocolError, Result};
use crate::network::connection::{split, MessageReader, MessageWriter};
use crate::network::socket::{configure_stream, create_listener};
use crate::pipeline::{Completed, OrderedReassembler, PoolInput, PoolSummary, RunningPool, WorkerPool};
use crate::protocol::{decode_chunk, Message, MessageType};
use crate::transform::SampleTransform;

/// Totals for one finished connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub session: Uuid,
    pub requests: u64,
    pub responses: u64,
    /// Chunks answered with an Error message instead of audio
    pub failed_chunks: u64,
    pub pool: PoolSummary,
}

#[derive(Debug, Default)]
struct ResponseStats {
    responses: u64,
    failed_chunks: u64,
}

/// Listening processing service
pub struct ProcessingServer {
    listener: TcpListener,
    network: NetworkConfig,
    pipeline: PipelineConfig,
    transform: Arc<dyn SampleTransform>,
}

impl ProcessingServer {
    /// Bind the listening socket. Must be called from within a tokio runtime.
    pub async fn bind(config: &AppConfig, transform: Arc<dyn SampleTransform>) -> Result<Self> {
        config.validate()?;
        let addr = config.network.bind_socket_addr()?;

        let listener = create_listener(addr, &config.network)?;
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;

        tracing::info!(
            "Processing service listening on {} ({} workers per connection, {} transform)",
            listener.local_addr()?,
            config.pipeline.workers,
            transform.name()
        );

        Ok(Self {
            listener,
            network: config.network.clone(),
            pipeline: config.pipeline.clone(),
            transform,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves, then wait for open sessions
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Session task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => match stream.into_std() {
                        Ok(stream) => {
                            let network = self.network.clone();
                            let pipeline = self.pipeline.clone();
                            let transform = self.transform.clone();
                            sessions.spawn_blocking(move || {
                                run_session(stream, peer, &network, &pipeline, transform)
                            });
                        }
                        Err(e) => tracing::warn!("Could not take over connection from {}: {}", peer, e),
                    },
                    Err(e) => tracing::warn!("Accept failed: {}", e),
                },
            }
        }

        if !sessions.is_empty() {
            tracing::info!("Waiting for {} open session(s)", sessions.len());
        }
        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                tracing::error!("Session task failed: {}", e);
            }
        }
        Ok(())
    }
}

fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    network: &NetworkConfig,
    pipeline: &PipelineConfig,
    transform: Arc<dyn SampleTransform>,
) {
    let session = Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session, peer = %peer);
    let _guard = span.enter();

    tracing::info!("Connection accepted");
    match handle_connection(session, stream, network, pipeline, transform) {
        Ok(summary) => tracing::info!(
            "Session finished: {} requests, {} responses, {} failed chunks",
            summary.requests,
            summary.responses,
            summary.failed_chunks
        ),
        Err(e) => tracing::warn!("Session terminated: {}", e),
    }
}

/// Serve one connection to completion on the calling thread
pub fn handle_connection(
    session: Uuid,
    stream: TcpStream,
    network: &NetworkConfig,
    pipeline: &PipelineConfig,
    transform: Arc<dyn SampleTransform>,
) -> Result<SessionSummary> {
    // Accepted sockets inherit the listener's non-blocking mode
    stream.set_nonblocking(false)?;
    configure_stream(&stream, network)?;
    let (mut reader, writer) = split(stream, network.max_frame_len)?;

    let RunningPool { input, output, handle } = WorkerPool::new(pipeline.workers)
        .with_queue_capacity(pipeline.queue_capacity())
        .spawn(transform)?;

    let span = tracing::Span::current();
    let responder = thread::Builder::new()
        .name("session-responder".to_string())
        .spawn(move || span.in_scope(|| respond(writer, output)))
        .map_err(PipelineError::Spawn)?;

    let received = receive_requests(&mut reader, &input);
    input.close();
    if let Err(e) = &received {
        tracing::warn!("Dropping connection: {}", e);
        reader.abort();
    }

    let responded = responder
        .join()
        .map_err(|_| Error::Pipeline(PipelineError::WorkerPanicked(1)));
    let pool = handle.join();

    let requests = received?;
    let stats = responded??;
    let pool = pool?;

    Ok(SessionSummary {
        session,
        requests,
        responses: stats.responses,
        failed_chunks: stats.failed_chunks,
        pool,
    })
}

/// Feed request chunks to the pool until the client half-closes
fn receive_requests(reader: &mut MessageReader, input: &PoolInput) -> Result<u64> {
    let mut descriptor = None;
    let mut next_id = 1u32;
    let mut requests = 0;

    while let Some(msg) = reader.recv()? {
        match msg.kind {
            MessageType::RequestAudio => {
                let chunk = decode_chunk(msg.payload)?;
                // Ids arrive as 1, 2, 3, ...; anything else would stall the ordered responder
                if chunk.sequence_id != next_id {
                    return Err(ProtocolError::OutOfSequence {
                        expected: next_id,
                        got: chunk.sequence_id,
                    }
                    .into());
                }
                match descriptor {
                    None => {
                        tracing::debug!("Stream layout: {:?}", chunk.descriptor);
                        descriptor = Some(chunk.descriptor);
                    }
                    Some(expected) if expected != chunk.descriptor => {
                        return Err(ProtocolError::DescriptorChanged.into());
                    }
                    Some(_) => {}
                }
                tracing::trace!("Request for chunk {} ({} bytes)", chunk.sequence_id, chunk.len());
                input.submit(chunk)?;
                next_id = next_id.wrapping_add(1);
                requests += 1;
            }
            MessageType::Error => match msg.error_report() {
                Some(report) => tracing::warn!("Client reported an error: {}", report.text),
                None => tracing::warn!("Client sent an unreadable error message"),
            },
            MessageType::ResponseAudio => {
                return Err(ProtocolError::UnexpectedMessage(msg.kind).into());
            }
        }
    }

    tracing::debug!("Client finished sending after {} requests", requests);
    Ok(requests)
}

/// Send completions back in sequence order, then half-close
fn respond(mut writer: MessageWriter, output: crossbeam_channel::Receiver<Completed>) -> Result<ResponseStats> {
    let mut stats = ResponseStats::default();

    let outcome = OrderedReassembler::new().run(&output, |completed: Completed| -> Result<()> {
        let msg = match completed {
            Ok(chunk) => {
                stats.responses += 1;
                Message::response(&chunk)
            }
            Err(failure) => {
                stats.failed_chunks += 1;
                Message::chunk_error(failure.sequence_id, &failure.error.to_string())
            }
        };
        writer.send(&msg)?;
        Ok(())
    });
    drop(output);

    match outcome {
        Ok(_) => {
            writer.half_close()?;
            Ok(stats)
        }
        Err(e) => {
            writer.abort();
            Err(e)
        }
    }
}
