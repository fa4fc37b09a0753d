//! # PCM Relay
//!
//! Chunked PCM streaming to a processing service that transforms chunks in
//! parallel and returns them in their original order.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── CLIENT ─────────────────────────────┐
//! │  ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐   │
//! │  │  WAV reader  │──▶│ Chunk producer │──▶│  Frame encoder   │───┼──┐
//! │  │ (container)  │   │   (pipeline)   │   │   (protocol)     │   │  │
//! │  └──────────────┘   └────────────────┘   └──────────────────┘   │  │
//! │                                                                 │  │
//! │  ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐   │  │
//! │  │  WAV writer  │◀──│ Receive slots  │◀──│  Frame decoder   │◀──┼─┐│
//! │  │ (container)  │   │   (pipeline)   │   │   (protocol)     │   │ ││
//! │  └──────────────┘   └────────────────┘   └──────────────────┘   │ ││
//! └─────────────────────────────────────────────────────────────────┘ ││
//!                                                   TCP, half-close   ││
//! ┌──────────────────────────── SERVER ─────────────────────────────┐ ││
//! │  ┌──────────────────┐   ┌─────────────────────────────────┐     │ ││
//! │  │  Frame decoder   │──▶│ Worker pool (W threads, 2W deep)│◀────┼─┼┘
//! │  └──────────────────┘   └───────────────┬─────────────────┘     │ │
//! │                                         ▼                       │ │
//! │  ┌──────────────────┐   ┌─────────────────────────────────┐     │ │
//! │  │  Frame encoder   │◀──│ Ordered reassembler (pending set)│    │ │
//! │  └────────┬─────────┘   └─────────────────────────────────┘     │ │
//! └───────────┼─────────────────────────────────────────────────────┘ │
//!             └───────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod container;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod transform;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default chunk size in frames
    pub const DEFAULT_CHUNK_FRAMES: usize = 4096;

    /// Default number of transform workers
    pub const DEFAULT_WORKERS: usize = 4;

    /// Queue slots per worker for the pool's input and output queues
    pub const QUEUE_DEPTH_PER_WORKER: usize = 2;

    /// Default TCP port for the processing service
    pub const DEFAULT_PORT: u16 = 42069;

    /// Default connect timeout in milliseconds
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Largest frame accepted from a peer (type byte + payload)
    pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

    /// Fraction of spectral bins kept by the low-pass transform
    pub const DEFAULT_LOW_PASS_KEEP: f64 = 0.25;
}
