//! Error types for the relay pipeline

use thiserror::Error;

use crate::protocol::MessageType;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Container (RIFF/WAVE) errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Malformed container: {0}")]
    Malformed(String),

    #[error("Unsupported audio layout: {0}")]
    Unsupported(String),

    #[error("Data region too large for a RIFF container: {0} bytes")]
    TooLarge(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("Empty frame (length 0)")]
    EmptyFrame,

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unexpected message: {0:?}")]
    UnexpectedMessage(MessageType),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Audio descriptor changed mid-stream")]
    DescriptorChanged,

    #[error("Out of sequence request: expected {expected}, got {got}")]
    OutOfSequence { expected: u32, got: u32 },

    #[error("Connection already closed for writing")]
    WriteClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Worker pool and reassembly errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Queue closed")]
    QueueClosed,

    #[error("Duplicate or already emitted sequence id: {0}")]
    DuplicateSequence(u32),

    #[error("Stream ended with sequence {next_expected} missing ({pending} results stranded)")]
    Incomplete { next_expected: u32, pending: usize },

    #[error("{0} worker(s) panicked")]
    WorkerPanicked(usize),

    #[error("Thread spawn failed: {0}")]
    Spawn(std::io::Error),
}

/// Sample transform errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Unsupported sample encoding: format {format_code}, {bit_depth} bits")]
    UnsupportedEncoding { format_code: u16, bit_depth: u16 },

    #[error("Invalid transform parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
