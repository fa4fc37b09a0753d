//! Length-prefixed message framing
//!
//! ```text
//! length:u32 (BE, = 1 + payload) | type:u8 | payload
//! ```
//!
//! A stream that ends exactly on a frame boundary is a clean end of input.
//! Ending anywhere else is a short read.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Read, Write};

use crate::error::ProtocolError;
use crate::protocol::message::{Message, MessageType};

/// Length prefix size
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Write one framed message
pub fn write_message<W: Write>(out: &mut W, msg: &Message) -> Result<(), ProtocolError> {
    let frame_len = msg.frame_len();
    if frame_len > u32::MAX as usize {
        return Err(ProtocolError::FrameTooLarge(frame_len));
    }

    let mut header = BytesMut::with_capacity(LENGTH_PREFIX_LEN + 1);
    header.put_u32(frame_len as u32);
    header.put_u8(msg.kind as u8);

    out.write_all(&header)?;
    out.write_all(&msg.payload)?;
    Ok(())
}

/// Read one framed message.
///
/// Returns `Ok(None)` when the peer closed the stream between frames.
pub fn read_message<R: Read>(input: &mut R, max_frame_len: usize) -> Result<Option<Message>, ProtocolError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    match read_full(input, &mut prefix)? {
        0 => return Ok(None),
        LENGTH_PREFIX_LEN => {}
        got => {
            return Err(ProtocolError::ShortRead {
                expected: LENGTH_PREFIX_LEN,
                got,
            })
        }
    }

    let frame_len = (&prefix[..]).get_u32() as usize;
    if frame_len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if frame_len > max_frame_len {
        return Err(ProtocolError::FrameTooLarge(frame_len));
    }

    let mut frame = vec![0u8; frame_len];
    let got = read_full(input, &mut frame)?;
    if got < frame_len {
        return Err(ProtocolError::ShortRead {
            expected: frame_len,
            got,
        });
    }

    let mut frame = Bytes::from(frame);
    let kind = MessageType::try_from(frame.get_u8())?;
    Ok(Some(Message { kind, payload: frame }))
}

/// Fill `buf` until it is full or the stream ends; returns bytes read
fn read_full<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_MAX_FRAME_LEN;
    use std::io::Cursor;

    fn framed(msgs: &[Message]) -> Vec<u8> {
        let mut out = Vec::new();
        for msg in msgs {
            write_message(&mut out, msg).unwrap();
        }
        out
    }

    #[test]
    fn test_frame_layout() {
        let bytes = framed(&[Message::new(MessageType::ResponseAudio, vec![0xAB, 0xCD])]);
        assert_eq!(bytes, vec![0, 0, 0, 3, 2, 0xAB, 0xCD]);
    }

    #[test]
    fn test_reads_sequence_then_clean_eof() {
        let first = Message::error("boom");
        let second = Message::new(MessageType::RequestAudio, Vec::<u8>::new());
        let mut input = Cursor::new(framed(&[first.clone(), second.clone()]));

        assert_eq!(read_message(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap(), Some(first));
        assert_eq!(read_message(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap(), Some(second));
        assert_eq!(read_message(&mut input, DEFAULT_MAX_FRAME_LEN).unwrap(), None);
    }

    #[test]
    fn test_truncation_is_short_read() {
        let bytes = framed(&[Message::error("truncated")]);

        let mut input = Cursor::new(bytes[..bytes.len() - 3].to_vec());
        assert!(matches!(
            read_message(&mut input, DEFAULT_MAX_FRAME_LEN),
            Err(ProtocolError::ShortRead { expected: 14, got: 11 })
        ));

        let mut input = Cursor::new(bytes[..2].to_vec());
        assert!(matches!(
            read_message(&mut input, DEFAULT_MAX_FRAME_LEN),
            Err(ProtocolError::ShortRead { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn test_rejects_bad_frames() {
        let mut input = Cursor::new(vec![0, 0, 0, 0]);
        assert!(matches!(read_message(&mut input, 64), Err(ProtocolError::EmptyFrame)));

        let mut input = Cursor::new(vec![0, 0, 1, 0, 1]);
        assert!(matches!(
            read_message(&mut input, 64),
            Err(ProtocolError::FrameTooLarge(256))
        ));

        let mut input = Cursor::new(vec![0, 0, 0, 1, 42]);
        assert!(matches!(
            read_message(&mut input, 64),
            Err(ProtocolError::UnknownMessageType(42))
        ));
    }
}
