//! TLS support for upload connections
//!
//! The uploader talks HTTPS to its backend with certificate validation
//! switched off: the device has no trust store and no reliable clock at the
//! moment it connects. TLS here buys confidentiality on the path, not peer
//! authentication.
//!
//! # Architecture
//!
//! 1. `TlsConfig` holds an OpenSSL context built by a client or server
//!    builder
//! 2. `TlsSessionOps` implements `SessionOps` for encrypted I/O
//! 3. HTTP code stays unchanged and runs over either transport
//!
//! The server side exists so the uploader can be exercised end to end
//! against a local HTTPS peer; it falls back to a freshly generated
//! self-signed certificate.
//!
//! # Examples
//!
//! ```no_run
//! use camlink::http::tls::TlsConfig;
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()?.verify_peer(false).build();
//! let tcp_stream = TcpStream::connect("detector.local:443")?;
//! let tls_session = tls_config.connect(tcp_stream, "detector.local")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cert;
pub mod config;
pub mod session;

pub use config::{ClientConfigBuilder, ServerConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
