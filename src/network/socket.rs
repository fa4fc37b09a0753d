//! Socket setup shared by both ends

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

use crate::config::NetworkConfig;

const LISTEN_BACKLOG: i32 = 128;

/// Create a listening socket with address reuse enabled
pub fn create_listener(addr: SocketAddr, config: &NetworkConfig) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    apply_buffer_sizes(&socket, config)?;

    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    tracing::debug!("Listening socket bound to {}", addr);
    Ok(socket.into())
}

/// Connect to `addr`, giving up after the configured timeout
pub fn connect(addr: SocketAddr, config: &NetworkConfig) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    apply_buffer_sizes(&socket, config)?;

    socket.connect_timeout(&addr.into(), config.connect_timeout())?;
    socket.set_nodelay(config.tcp_nodelay)?;

    tracing::debug!("Connected to {}", addr);
    Ok(socket.into())
}

/// Apply per-connection options to an accepted stream
pub fn configure_stream(stream: &TcpStream, config: &NetworkConfig) -> io::Result<()> {
    let socket = SockRef::from(stream);
    socket.set_nodelay(config.tcp_nodelay)?;
    apply_buffer_sizes(&socket, config)
}

fn apply_buffer_sizes(socket: &Socket, config: &NetworkConfig) -> io::Result<()> {
    if let Some(size) = config.send_buffer_size {
        socket.set_send_buffer_size(size)?;
    }
    if let Some(size) = config.recv_buffer_size {
        socket.set_recv_buffer_size(size)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn loopback_config() -> NetworkConfig {
        NetworkConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            send_buffer_size: Some(64 * 1024),
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_listener_accepts_connection() {
        let config = loopback_config();
        let listener = create_listener(config.bind_socket_addr().unwrap(), &config).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let mut client = connect(addr, &config).unwrap();
        let (mut accepted, _) = listener.accept().unwrap();
        configure_stream(&accepted, &config).unwrap();
        assert!(accepted.nodelay().unwrap());

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        accepted.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_connect_refused_is_error() {
        let config = loopback_config();
        let listener = create_listener(config.bind_socket_addr().unwrap(), &config).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(connect(addr, &config).is_err());
    }
}
