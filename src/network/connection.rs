//! Framed message streams over one TCP connection
//!
//! A connection is split into a reader and a writer so that sending and
//! receiving run on separate threads. Both halves share the connection state:
//!
//! ```text
//!   Open ──half_close()──▶ WriteClosed ──peer EOF──▶ Closed
//!     │                                                 ▲
//!     └──────peer EOF──▶ PeerWriteClosed ──half_close()─┘
//! ```

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::ProtocolError;
use crate::protocol::{read_message, write_message, Message};

const LOCAL_WRITE_CLOSED: u8 = 0b01;
const PEER_WRITE_CLOSED: u8 = 0b10;

/// Lifecycle of a connection as seen from this end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Both directions carry data
    Open,
    /// This end has signalled end of requests; responses may still arrive
    WriteClosed,
    /// The peer has signalled end of its messages; this end may still send
    PeerWriteClosed,
    /// Both directions are finished
    Closed,
}

#[derive(Debug, Default)]
struct SharedState(AtomicU8);

impl SharedState {
    fn mark(&self, flag: u8) -> ConnectionState {
        Self::decode(self.0.fetch_or(flag, Ordering::AcqRel) | flag)
    }

    fn get(&self) -> ConnectionState {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    fn decode(bits: u8) -> ConnectionState {
        match bits & (LOCAL_WRITE_CLOSED | PEER_WRITE_CLOSED) {
            0 => ConnectionState::Open,
            LOCAL_WRITE_CLOSED => ConnectionState::WriteClosed,
            PEER_WRITE_CLOSED => ConnectionState::PeerWriteClosed,
            _ => ConnectionState::Closed,
        }
    }
}

/// Split a connected stream into its receiving and sending halves
pub fn split(stream: TcpStream, max_frame_len: usize) -> io::Result<(MessageReader, MessageWriter)> {
    let peer = stream.peer_addr()?;
    let state = Arc::new(SharedState::default());
    let read_half = stream.try_clone()?;

    let reader = MessageReader {
        inner: BufReader::new(read_half),
        max_frame_len,
        state: state.clone(),
        received: 0,
    };
    let writer = MessageWriter {
        inner: BufWriter::new(stream),
        peer,
        state,
        sent: 0,
    };
    Ok((reader, writer))
}

/// Receiving half
pub struct MessageReader {
    inner: BufReader<TcpStream>,
    max_frame_len: usize,
    state: Arc<SharedState>,
    received: u64,
}

impl MessageReader {
    /// Next message, or `None` once the peer has half-closed
    pub fn recv(&mut self) -> Result<Option<Message>, ProtocolError> {
        match read_message(&mut self.inner, self.max_frame_len)? {
            Some(msg) => {
                self.received += 1;
                Ok(Some(msg))
            }
            None => {
                let state = self.state.mark(PEER_WRITE_CLOSED);
                tracing::debug!("Peer finished sending after {} messages ({:?})", self.received, state);
                Ok(None)
            }
        }
    }

    pub fn messages_received(&self) -> u64 {
        self.received
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Tear the connection down in both directions, waking a blocked peer half
    pub fn abort(&self) {
        if let Err(e) = self.inner.get_ref().shutdown(Shutdown::Both) {
            tracing::debug!("Shutdown after abort: {}", e);
        }
        self.state.mark(LOCAL_WRITE_CLOSED | PEER_WRITE_CLOSED);
    }
}

/// Sending half
pub struct MessageWriter {
    inner: BufWriter<TcpStream>,
    peer: SocketAddr,
    state: Arc<SharedState>,
    sent: u64,
}

impl MessageWriter {
    /// Frame and flush one message
    pub fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        if matches!(self.state.get(), ConnectionState::WriteClosed | ConnectionState::Closed) {
            return Err(ProtocolError::WriteClosed);
        }
        write_message(&mut self.inner, msg)?;
        self.inner.flush()?;
        self.sent += 1;
        Ok(())
    }

    /// Signal end of messages; the receiving direction stays open
    pub fn half_close(&mut self) -> Result<ConnectionState, ProtocolError> {
        if matches!(self.state.get(), ConnectionState::WriteClosed | ConnectionState::Closed) {
            return Err(ProtocolError::WriteClosed);
        }
        self.inner.flush()?;
        self.inner.get_ref().shutdown(Shutdown::Write)?;

        let state = self.state.mark(LOCAL_WRITE_CLOSED);
        tracing::debug!("Half-closed connection to {} after {} messages", self.peer, self.sent);
        Ok(state)
    }

    /// Tear the connection down in both directions, waking a blocked reader
    pub fn abort(&mut self) {
        if let Err(e) = self.inner.get_ref().shutdown(Shutdown::Both) {
            tracing::debug!("Shutdown after abort: {}", e);
        }
        self.state.mark(LOCAL_WRITE_CLOSED | PEER_WRITE_CLOSED);
    }

    pub fn messages_sent(&self) -> u64 {
        self.sent
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_MAX_FRAME_LEN;
    use crate::protocol::MessageType;
    use std::net::TcpListener;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_half_close_keeps_reverse_direction_open() {
        let (client, server) = pair();
        let (mut client_rx, mut client_tx) = split(client, DEFAULT_MAX_FRAME_LEN).unwrap();
        let (mut server_rx, mut server_tx) = split(server, DEFAULT_MAX_FRAME_LEN).unwrap();

        client_tx.send(&Message::new(MessageType::RequestAudio, vec![1, 2, 3])).unwrap();
        assert_eq!(client_tx.half_close().unwrap(), ConnectionState::WriteClosed);

        let request = server_rx.recv().unwrap().unwrap();
        assert_eq!(request.payload.as_ref(), &[1, 2, 3]);
        assert!(server_rx.recv().unwrap().is_none());
        assert_eq!(server_rx.state(), ConnectionState::PeerWriteClosed);

        // Responses still flow after the client stopped sending
        server_tx.send(&Message::new(MessageType::ResponseAudio, vec![9])).unwrap();
        assert_eq!(server_tx.half_close().unwrap(), ConnectionState::Closed);

        let response = client_rx.recv().unwrap().unwrap();
        assert_eq!(response.kind, MessageType::ResponseAudio);
        assert!(client_rx.recv().unwrap().is_none());
        assert_eq!(client_rx.state(), ConnectionState::Closed);
        assert_eq!(client_rx.messages_received(), 1);
    }

    #[test]
    fn test_send_after_half_close_fails() {
        let (client, _server) = pair();
        let (_rx, mut tx) = split(client, DEFAULT_MAX_FRAME_LEN).unwrap();

        tx.half_close().unwrap();
        assert!(matches!(
            tx.send(&Message::error("late")),
            Err(ProtocolError::WriteClosed)
        ));
        assert!(matches!(tx.half_close(), Err(ProtocolError::WriteClosed)));
    }

    #[test]
    fn test_abort_wakes_blocked_reader() {
        let (client, _server) = pair();
        let (mut rx, mut tx) = split(client, DEFAULT_MAX_FRAME_LEN).unwrap();

        let blocked = std::thread::spawn(move || rx.recv());
        std::thread::sleep(std::time::Duration::from_millis(50));
        tx.abort();

        let result = blocked.join().unwrap();
        assert!(matches!(result, Ok(None) | Err(ProtocolError::Io(_))));
        assert_eq!(tx.state(), ConnectionState::Closed);
    }
}
