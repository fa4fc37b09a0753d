//! Message envelope carried by the wire framing

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::audio::Chunk;
use crate::error::ProtocolError;
use crate::protocol::payload::encode_chunk;

/// Sequence id used by Error messages that are not about one chunk
pub const STREAM_ERROR_ID: u32 = 0;

/// Message type tag (first byte after the length prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    RequestAudio = 1,
    ResponseAudio = 2,
    Error = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, ProtocolError> {
        match tag {
            1 => Ok(Self::RequestAudio),
            2 => Ok(Self::ResponseAudio),
            3 => Ok(MessageType::Error),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Typed, opaque-payload transport envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Chunk submitted for processing
    pub fn request(chunk: &Chunk) -> Self {
        Self::new(MessageType::RequestAudio, encode_chunk(chunk))
    }

    /// Processed chunk returned to the client
    pub fn response(chunk: &Chunk) -> Self {
        Self::new(MessageType::ResponseAudio, encode_chunk(chunk))
    }

    /// Error report for the whole stream
    pub fn error(text: &str) -> Self {
        Self::chunk_error(STREAM_ERROR_ID, text)
    }

    /// Error report tied to one chunk: sequence id (u32 LE) then UTF-8 text
    pub fn chunk_error(sequence_id: u32, text: &str) -> Self {
        let mut payload = BytesMut::with_capacity(4 + text.len());
        payload.put_u32_le(sequence_id);
        payload.put_slice(text.as_bytes());
        Self::new(MessageType::Error, payload.freeze())
    }

    /// Length field value for this message on the wire
    pub fn frame_len(&self) -> usize {
        1 + self.payload.len()
    }

    /// Decode the payload of an Error message
    pub fn error_report(&self) -> Option<ErrorReport> {
        if self.kind != MessageType::Error || self.payload.len() < 4 {
            return None;
        }
        let mut payload = self.payload.clone();
        let sequence_id = match payload.get_u32_le() {
            STREAM_ERROR_ID => None,
            id => Some(id),
        };
        Some(ErrorReport {
            sequence_id,
            text: String::from_utf8_lossy(&payload).into_owned(),
        })
    }
}

/// Contents of an Error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Failed chunk, `None` when the error concerns the whole stream
    pub sequence_id: Option<u32>,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        assert_eq!(MessageType::try_from(1).unwrap(), MessageType::RequestAudio);
        assert_eq!(MessageType::try_from(2).unwrap(), MessageType::ResponseAudio);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::Error);
        assert!(matches!(
            MessageType::try_from(9),
            Err(ProtocolError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn test_chunk_error_payload() {
        let msg = Message::chunk_error(7, "unsupported encoding");
        assert_eq!(msg.kind, MessageType::Error);
        assert_eq!(
            msg.error_report(),
            Some(ErrorReport { sequence_id: Some(7), text: "unsupported encoding".to_string() })
        );
        assert_eq!(msg.frame_len(), 1 + 4 + 20);
    }

    #[test]
    fn test_stream_error_has_no_sequence() {
        let report = Message::error("stream incomplete").error_report().unwrap();
        assert_eq!(report.sequence_id, None);
        assert_eq!(report.text, "stream incomplete");

        let not_error = Message::new(MessageType::ResponseAudio, vec![0u8; 8]);
        assert_eq!(not_error.error_report(), None);
    }
}
