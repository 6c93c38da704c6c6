//! Socket setup
//!
//! Connecting with a bounded timeout and opening the provisioning listener
//! both go through `socket2` so the socket options are set before the
//! socket is used.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Connection to {addr} failed: {source}")]
    Connect { addr: String, source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Open a TCP connection, trying each resolved address in turn
///
/// Nagle is disabled; the upload writes are already chunked. `timeout`
/// applies to each connect attempt only: the blocking name lookup that
/// precedes them is not bounded.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let target = format!("{}:{}", host, port);
    if host.is_empty() || port == 0 {
        return Err(Error::Resolve(target));
    }

    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(target.clone()))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Resolve(target));
    }

    let mut last_err = None;
    for addr in addrs {
        match connect_addr(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                log::debug!("connect {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(Error::Connect {
        addr: target,
        source: last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotConnected)),
    })
}

fn connect_addr(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.connect_timeout(&SockAddr::from(addr), timeout)?;
    Ok(socket.into())
}

/// Bind a listening socket with address reuse enabled
pub fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(4)?;
    Ok(socket.into())
}
