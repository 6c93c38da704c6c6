//! Session operations abstraction
//!
//! This module provides the session operations pattern that lets the HTTP
//! code run unchanged over plain TCP and TLS. Every read and write on an
//! `HttpSession` first polls the transport with the session timeout, which
//! is how the uploader bounds each network wait.

use super::{Error, Result};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Session operations trait
///
/// Abstracts over plain TCP and TLS connections.
pub trait SessionOps {
    /// Wait until the session is ready for `events`
    ///
    /// Returns false if the timeout elapsed first. `None` waits forever.
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Poll a raw descriptor with libc
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        // SAFETY: pfd is a valid pollfd for the duration of the call
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Io(err));
        }

        return Ok(result > 0);
    }
}

/// HTTP session wrapping a transport with session operations
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a session with the default 10 second timeout
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Set the per-operation timeout; `None` blocks indefinitely
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read data with timeout
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }

        self.session.read(buf)
    }

    /// Write data with timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Write, self.timeout)? {
            return Err(Error::Timeout);
        }

        self.session.write(buf)
    }

    /// Write the whole buffer; a zero-byte write counts as a closed peer
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }
        Ok(())
    }

    /// Read exactly `len` bytes
    pub fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            filled += n;
        }
        Ok(buf)
    }

    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    pub fn get_ref(&self) -> &S {
        &self.session
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

/// Plain TCP session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        use std::net::Shutdown;
        match self.stream.shutdown(Shutdown::Both) {
            // Peer already gone
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Error::from),
        }
    }
}

/// Helper to create an HTTP session from a TCP stream
pub fn from_tcp_stream(stream: TcpStream) -> HttpSession<FdSessionOps> {
    HttpSession::new(FdSessionOps::new(stream))
}
