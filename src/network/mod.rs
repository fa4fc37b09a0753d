//! TCP transport between the streaming client and the processing service

pub mod client;
pub mod connection;
pub mod server;
pub mod socket;

pub use client::{stream_file, TransferReport};
pub use connection::{split, ConnectionState, MessageReader, MessageWriter};
pub use server::{ProcessingServer, SessionSummary};
pub use socket::{configure_stream, connect, create_listener};
