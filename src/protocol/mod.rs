//! Wire protocol: message envelope, framing and chunk payloads

pub mod framing;
pub mod message;
pub mod payload;

pub use framing::{read_message, write_message};
pub use message::{ErrorReport, Message, MessageType, STREAM_ERROR_ID};
pub use payload::{decode_chunk, encode_chunk};
