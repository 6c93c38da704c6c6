//! TLS session operations
//!
//! This module implements the SessionOps trait for TLS connections.

use super::config::{TlsConfig, TlsError};
use crate::http::session::{poll_fd, PollEvents, SessionOps};
use crate::http::{Error, Result as HttpResult};
use openssl::ssl::{Ssl, SslStream};
use std::io::{Read, Write};
use std::net::{IpAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS session operations
///
/// Wraps an OpenSSL `SslStream` and provides poll/read/write/close.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsSessionOps {
    /// Client handshake
    ///
    /// The handshake runs in blocking mode; bound it with socket timeouts on
    /// `tcp_stream` beforehand.
    pub fn connect(
        tcp_stream: TcpStream,
        config: &TlsConfig,
        servername: &str,
    ) -> std::result::Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        if !servername.is_empty() && servername.parse::<IpAddr>().is_err() {
            ssl.set_hostname(servername)?;
        }

        let stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Connection failed: {}", e)))?;

        log::debug!(
            "TLS established: {} {}",
            stream.ssl().version_str(),
            stream
                .ssl()
                .current_cipher()
                .map(|c| c.name())
                .unwrap_or("<none>")
        );

        Ok(TlsSessionOps {
            stream,
            failed: false,
        })
    }

    /// Server handshake
    pub fn accept(
        tcp_stream: TcpStream,
        config: &TlsConfig,
    ) -> std::result::Result<Self, TlsError> {
        let ssl = Ssl::new(&config.ctx)?;

        let stream = ssl
            .accept(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("Accept failed: {}", e)))?;

        Ok(TlsSessionOps {
            stream,
            failed: false,
        })
    }

    /// Whether an I/O operation has failed on this session
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn get_ref(&self) -> &TcpStream {
        self.stream.get_ref()
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        // Decrypted bytes may already be buffered inside OpenSSL
        if events == PollEvents::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        self.stream.read(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        self.stream.write(buf).map_err(|e| {
            self.failed = true;
            Error::Io(e)
        })
    }

    fn close(&mut self) -> HttpResult<()> {
        // Skip close_notify on a broken session
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        use std::net::Shutdown;
        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Error::from),
        }
    }
}
